use url::Url;

use crate::config::{self, BackendOptions, Credentials, Settings};
use crate::message::EmailMessage;
use crate::request::MessageRequest;
use crate::transport::{HttpTransport, Transport};
use crate::Error;

/// Generic contract for anything that can deliver `EmailMessage`s
pub trait MailBackend {
    /// Open a connection, if the backend holds one
    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Close any open connection
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Send messages one at a time and return how many were sent.
    ///
    /// Returns `None` when there is nothing to send.
    fn send_messages(&mut self, messages: &[EmailMessage]) -> Result<Option<usize>, Error>;
}

/// Delivers messages through the Mailgun HTTP API, one POST per message.
///
/// Each send is a single stateless round trip: there are no retries and no
/// connection is held between sends.
pub struct MailgunBackend<T = HttpTransport> {
    /// `None` when built with `fail_silently` and no credentials
    endpoint: Option<(Url, Credentials)>,
    default_from: Option<String>,
    fail_silently: bool,
    transport: T,
}

impl MailgunBackend<HttpTransport> {
    /// Build a backend over HTTP, loading settings from the default
    /// location and the environment.
    pub fn from_env(options: BackendOptions) -> Result<Self, Error> {
        let settings = match config::load_settings(None) {
            Ok(settings) => settings,
            Err(e) if options.fail_silently => {
                log::warn!("Could not load Mailgun settings: {}", e);
                Settings::default()
            }
            Err(e) => return Err(e),
        };

        Self::new(options, &settings)
    }

    pub fn new(options: BackendOptions, settings: &Settings) -> Result<Self, Error> {
        Self::with_transport(options, settings, HttpTransport::new()?)
    }
}

impl<T: Transport> MailgunBackend<T> {
    /// Resolve credentials once. When they are missing, the backend is
    /// disabled if `fail_silently` is set and construction fails otherwise.
    pub fn with_transport(options: BackendOptions, settings: &Settings, transport: T) -> Result<Self, Error> {
        let endpoint = match resolve_endpoint(&options, settings) {
            Ok(endpoint) => Some(endpoint),
            Err(e) if options.fail_silently => {
                log::warn!("Mailgun backend disabled: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            endpoint,
            default_from: settings.default_from.clone(),
            fail_silently: options.fail_silently,
            transport,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    /// Target of every request, if configured
    pub fn url(&self) -> Option<&Url> {
        self.endpoint.as_ref().map(|(url, _)| url)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a single message.
    ///
    /// `Ok(false)` means the message was not sent: it had no recipients,
    /// or it failed and `fail_silently` swallowed the error.
    pub fn send(&self, mail: &EmailMessage) -> Result<bool, Error> {
        if !mail.has_recipients() {
            log::debug!("Not sending message without recipients: {:?}", mail.subject);
            return Ok(false);
        }

        match self.deliver(mail) {
            Ok(()) => Ok(true),
            Err(e) if self.fail_silently => {
                log::warn!("Failed to send message {:?}: {}", mail.subject, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Translate, POST and map the response. Every failure comes back as
    /// an `Error`; the fail-silently policy is applied by `send`.
    fn deliver(&self, mail: &EmailMessage) -> Result<(), Error> {
        let (url, creds) = self.endpoint.as_ref().ok_or(Error::NotConfigured)?;

        let request = MessageRequest::from_message(mail, self.default_from.as_deref())?;

        log::debug!(
            "POST {} ({} recipients, {} attachments)",
            url,
            request.num_recipients(),
            request.files.len()
        );

        let resp = self.transport.post(url, &creds.api_key, &request)?;

        if resp.status != reqwest::StatusCode::OK {
            return Err(Error::Api {
                status: resp.status,
                body: resp.body,
            });
        }

        let id = resp.parsed().and_then(|r| r.id);
        log::info!("Message accepted by Mailgun: {}", id.as_deref().unwrap_or("<no id>"));

        Ok(())
    }
}

impl<T: Transport> MailBackend for MailgunBackend<T> {
    fn send_messages(&mut self, messages: &[EmailMessage]) -> Result<Option<usize>, Error> {
        if messages.is_empty() {
            return Ok(None);
        }

        let mut num_sent = 0;
        for message in messages {
            if self.send(message)? {
                num_sent += 1;
            }
        }

        Ok(Some(num_sent))
    }
}

fn resolve_endpoint(options: &BackendOptions, settings: &Settings) -> Result<(Url, Credentials), Error> {
    let creds = config::resolve_credentials(options, settings)?;
    let url = config::messages_url(&settings.api_url, &creds.domain_name)?;
    Ok((url, creds))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use reqwest::StatusCode;

    use crate::transport::ApiResponse;

    /// Records every request and answers from a script.
    /// Once the script runs out, every request gets a 200.
    #[derive(Default)]
    struct FakeTransport {
        sent: RefCell<Vec<(Url, String, MessageRequest)>>,
        script: RefCell<VecDeque<Result<StatusCode, Error>>>,
    }

    impl FakeTransport {
        fn answering(script: Vec<Result<StatusCode, Error>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                ..Default::default()
            }
        }

        fn num_sent(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl Transport for FakeTransport {
        fn post(&self, url: &Url, api_key: &str, request: &MessageRequest) -> Result<ApiResponse, Error> {
            self.sent
                .borrow_mut()
                .push((url.clone(), api_key.to_string(), request.clone()));

            let status = self.script.borrow_mut().pop_front().unwrap_or(Ok(StatusCode::OK))?;
            let body = if status == StatusCode::OK {
                r#"{"id": "<1@mg.example.com>", "message": "Queued. Thank you."}"#.to_string()
            } else {
                r#"{"message": "Something went wrong"}"#.to_string()
            };

            Ok(ApiResponse { status, body })
        }
    }

    fn options(fail_silently: bool) -> BackendOptions {
        BackendOptions::new()
            .with_api_key("key-test")
            .with_domain_name("mg.example.com")
            .fail_silently(fail_silently)
    }

    fn backend(fail_silently: bool, transport: FakeTransport) -> MailgunBackend<FakeTransport> {
        MailgunBackend::with_transport(options(fail_silently), &Settings::default(), transport).unwrap()
    }

    fn mail(n: usize) -> EmailMessage {
        EmailMessage::new()
            .with_sender("sender@example.com")
            .with_recipients(vec![format!("user{}@example.com", n)])
            .with_subject(format!("Message {}", n))
            .with_text("hello")
    }

    #[test]
    fn posts_to_messages_endpoint() {
        let backend = backend(false, FakeTransport::default());

        assert!(backend.send(&mail(1)).unwrap());

        let sent = backend.transport().sent.borrow();
        let (url, api_key, request) = &sent[0];
        assert_eq!(url.as_str(), "https://api.mailgun.net/v3/mg.example.com/messages");
        assert_eq!(api_key, "key-test");
        assert_eq!(request.get("to"), Some("user1@example.com"));
        assert_eq!(request.get("text"), Some("hello"));
    }

    #[test]
    fn no_recipients_is_local_failure() {
        let backend = backend(false, FakeTransport::default());
        let empty = EmailMessage::new().with_sender("sender@example.com").with_text("hi");

        assert!(!backend.send(&empty).unwrap());
        assert_eq!(backend.transport().num_sent(), 0);
    }

    #[test]
    fn provider_error_propagates() {
        let transport = FakeTransport::answering(vec![Ok(StatusCode::BAD_REQUEST)]);
        let backend = backend(false, transport);

        match backend.send(&mail(1)) {
            Err(Error::Api { status, body }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("Something went wrong"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn non_200_success_codes_are_errors() {
        let transport = FakeTransport::answering(vec![Ok(StatusCode::ACCEPTED)]);
        let backend = backend(false, transport);

        assert!(matches!(backend.send(&mail(1)), Err(Error::Api { .. })));
    }

    #[test]
    fn provider_error_swallowed() {
        let transport = FakeTransport::answering(vec![Ok(StatusCode::UNAUTHORIZED)]);
        let backend = backend(true, transport);

        assert!(!backend.send(&mail(1)).unwrap());
    }

    #[test]
    fn transport_error_policy() {
        let transport = FakeTransport::answering(vec![Err(Error::Timeout)]);
        let loud = backend(false, transport);
        assert!(matches!(loud.send(&mail(1)), Err(Error::Timeout)));

        let transport = FakeTransport::answering(vec![Err(Error::Transport("connection refused".into()))]);
        let quiet = backend(true, transport);
        assert!(!quiet.send(&mail(1)).unwrap());
    }

    #[test]
    fn invalid_address_follows_policy() {
        let bad = mail(1).with_cc(vec!["a@example.com, b@example.com"]);

        let loud = backend(false, FakeTransport::default());
        assert!(matches!(loud.send(&bad), Err(Error::InvalidAddress(_))));

        let quiet = backend(true, FakeTransport::default());
        assert!(!quiet.send(&bad).unwrap());
        assert_eq!(quiet.transport().num_sent(), 0);
    }

    #[test]
    fn batch_continues_when_failing_silently() {
        let transport =
            FakeTransport::answering(vec![Ok(StatusCode::OK), Ok(StatusCode::INTERNAL_SERVER_ERROR), Ok(StatusCode::OK)]);
        let mut backend = backend(true, transport);

        let sent = backend.send_messages(&[mail(1), mail(2), mail(3)]).unwrap();

        assert_eq!(sent, Some(2));
        assert_eq!(backend.transport().num_sent(), 3);
    }

    #[test]
    fn batch_stops_on_first_error() {
        let transport =
            FakeTransport::answering(vec![Ok(StatusCode::OK), Ok(StatusCode::INTERNAL_SERVER_ERROR), Ok(StatusCode::OK)]);
        let mut backend = backend(false, transport);

        let result = backend.send_messages(&[mail(1), mail(2), mail(3)]);

        assert!(matches!(result, Err(Error::Api { .. })));
        assert_eq!(backend.transport().num_sent(), 2);
    }

    #[test]
    fn batch_counts_skipped_messages_as_failures() {
        let mut backend = backend(false, FakeTransport::default());
        let empty = EmailMessage::new().with_text("nobody");

        let sent = backend.send_messages(&[mail(1), empty, mail(3)]).unwrap();

        assert_eq!(sent, Some(2));
        assert_eq!(backend.transport().num_sent(), 2);
    }

    #[test]
    fn empty_batch() {
        let mut backend = backend(false, FakeTransport::default());

        assert_eq!(backend.send_messages(&[]).unwrap(), None);
        assert_eq!(backend.transport().num_sent(), 0);
    }

    #[test]
    fn open_and_close_do_nothing() {
        let mut backend = backend(false, FakeTransport::default());

        backend.open().unwrap();
        backend.close().unwrap();
        assert_eq!(backend.transport().num_sent(), 0);
    }

    #[test]
    fn missing_config_fails_construction() {
        let options = BackendOptions::new().with_api_key("key-test");
        let result = MailgunBackend::with_transport(options, &Settings::default(), FakeTransport::default());

        assert!(matches!(result, Err(Error::MissingSetting(_))));
    }

    #[test]
    fn missing_config_disables_backend() {
        let options = BackendOptions::new().fail_silently(true);
        let backend = MailgunBackend::with_transport(options, &Settings::default(), FakeTransport::default()).unwrap();

        assert!(!backend.is_enabled());
        assert!(backend.url().is_none());
        assert!(!backend.send(&mail(1)).unwrap());
        assert_eq!(backend.transport().num_sent(), 0);
    }

    #[test]
    fn settings_supply_credentials_and_sender() {
        let settings = Settings {
            api_key: Some("key-settings".into()),
            domain_name: Some("mg.settings.com".into()),
            api_url: "https://api.eu.mailgun.net".into(),
            default_from: Some("Robot <robot@settings.com>".into()),
        };
        let backend = MailgunBackend::with_transport(BackendOptions::new(), &settings, FakeTransport::default()).unwrap();

        let mut message = mail(1);
        message.from_email = None;
        assert!(backend.send(&message).unwrap());

        let sent = backend.transport().sent.borrow();
        let (url, api_key, request) = &sent[0];
        assert_eq!(url.as_str(), "https://api.eu.mailgun.net/v3/mg.settings.com/messages");
        assert_eq!(api_key, "key-settings");
        assert_eq!(request.get("from"), Some("Robot <robot@settings.com>"));
    }
}
