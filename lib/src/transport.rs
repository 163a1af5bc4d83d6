use reqwest::blocking::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::request::{FilePart, MessageRequest};
use crate::Error;

/// Basic auth user for the Mailgun API; the API key is the password
pub const API_USER: &str = "api";

/// Raw outcome of a request that reached the API
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Body Mailgun returns for accepted (and most rejected) messages
#[derive(Deserialize, Debug, Default)]
pub struct SendResponse {
    pub id: Option<String>,
    pub message: Option<String>,
}

impl ApiResponse {
    /// Parse the JSON body, if it is one
    pub fn parsed(&self) -> Option<SendResponse> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Sends a single `MessageRequest` to the API.
///
/// Implementations make exactly one attempt. Network-level failures are
/// returned as `Error::Transport`/`Error::Timeout`; any HTTP answer,
/// successful or not, is an `ApiResponse`.
pub trait Transport {
    fn post(&self, url: &Url, api_key: &str, request: &MessageRequest) -> Result<ApiResponse, Error>;
}

/// Blocking HTTP transport
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &Url, api_key: &str, request: &MessageRequest) -> Result<ApiResponse, Error> {
        let req = self
            .client
            .post(url.clone())
            .basic_auth(API_USER, Some(api_key));

        // Plain form unless there is something to upload
        let req = if request.files.is_empty() {
            req.form(&request.fields)
        } else {
            req.multipart(build_form(request))
        };

        let resp = req.send()?;
        let status = resp.status();
        let body = match resp.text() {
            Ok(body) => body,
            // Keep the status of a rejection even if its body is unreadable
            Err(e) if status != StatusCode::OK => {
                log::warn!("Could not read {} response body: {}", status, e);
                String::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ApiResponse { status, body })
    }
}

fn build_form(request: &MessageRequest) -> Form {
    let mut form = Form::new();

    for (name, value) in &request.fields {
        form = form.text(*name, value.clone());
    }

    for file in &request.files {
        form = form.part("attachment", file_part(file));
    }

    form
}

fn file_part(file: &FilePart) -> Part {
    let part = Part::bytes(file.content.clone()).file_name(file.filename.clone());

    match part.mime_str(&file.mimetype) {
        Ok(part) => part,
        Err(_) => {
            log::warn!(
                "Ignoring invalid mimetype {:?} for attachment {}",
                file.mimetype,
                file.filename
            );
            Part::bytes(file.content.clone()).file_name(file.filename.clone())
        }
    }
}
