use std::io::Read;

use structopt::StructOpt;

use mailgun_backend::{load_settings, BackendOptions, Error, MailgunBackend};

mod mime;

// sysexits.h
const EX_OK: i32 = 0;
const EX_USAGE: i32 = 64;
const EX_DATAERR: i32 = 65;
const EX_UNAVAILABLE: i32 = 69;
const EX_TEMPFAIL: i32 = 75;
const EX_CONFIG: i32 = 78;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mailgun-sendmail",
    about = "Sendmail-compatible filter that delivers mail through Mailgun."
)]
struct Opt {
    /// Sender address (overrides the From header)
    #[structopt(short = "f", long = "from")]
    from: Option<String>,

    /// Read recipients from the To, Cc and Bcc headers
    #[structopt(short = "t")]
    read_recipients: bool,

    /// Ignored; accepted for sendmail compatibility
    #[structopt(short = "i", hidden = true)]
    _ignore_dots: bool,

    /// Settings file
    #[structopt(short, long)]
    config: Option<String>,

    /// Report failures through the exit code only
    #[structopt(long)]
    fail_silently: bool,

    recipients: Vec<String>,
}

/// Map a send error to a sysexits code. Transport failures and
/// throttling/server errors are temporary so the MTA can retry.
fn exit_code(err: &Error) -> i32 {
    match err {
        Error::MissingSetting(_) | Error::NotConfigured | Error::Settings(_) => EX_CONFIG,
        Error::InvalidAddress(_) => EX_DATAERR,
        Error::Timeout | Error::Transport(_) => EX_TEMPFAIL,
        Error::Api { status, .. } if status.is_server_error() || status.as_u16() == 429 => EX_TEMPFAIL,
        Error::Api { .. } => EX_UNAVAILABLE,
    }
}

fn run(opt: Opt) -> i32 {
    // Get message from stdin
    let mut content = Vec::new();
    if let Err(e) = std::io::stdin().read_to_end(&mut content) {
        log::error!("Failed to read message from stdin: {}", e);
        return EX_DATAERR;
    }

    let mut mail = match mime::from_mime(&content) {
        Ok(mail) => mail,
        Err(e) => {
            log::error!("Failed to parse message: {}", e);
            return EX_DATAERR;
        }
    };

    if !opt.read_recipients {
        mail.to.clear();
        mail.cc.clear();
        mail.bcc.clear();
    }
    mail.to.extend(opt.recipients);

    if let Some(from) = opt.from {
        mail.from_email = Some(from);
    }

    if !mail.has_recipients() {
        log::error!("No recipients given");
        return EX_USAGE;
    }

    let settings = match load_settings(opt.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{}", e);
            return exit_code(&e);
        }
    };

    let options = BackendOptions::new().fail_silently(opt.fail_silently);
    let backend = match MailgunBackend::new(options, &settings) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("{}", e);
            return exit_code(&e);
        }
    };

    match backend.send(&mail) {
        Ok(true) => {
            log::info!("Sent {:?} to {} recipient(s)", mail.subject, mail.recipients().len());
            EX_OK
        }
        Ok(false) => EX_UNAVAILABLE,
        Err(e) => {
            log::error!("Could not send {:?}: {}", mail.subject, e);
            exit_code(&e)
        }
    }
}

fn main() {
    // Init logger
    env_logger::builder().format_timestamp_micros().init();

    let opt = Opt::from_args();

    std::process::exit(run(opt));
}
