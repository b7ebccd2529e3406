use bitaxe_logger_common::error::TransportError;
use bitaxe_logger_common::http::{HttpRequest, HttpResponse, HttpTransport, Method as RequestMethod};
use embedded_svc::http::{client::Client as HttpClient, Method};
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use log::info;

/// Response bodies are cut off past this many bytes.
const MAX_BODY: usize = 16 * 1024;

/// Opens a fresh connection per request, like a one-shot `HTTPClient`.
#[derive(Default)]
pub struct EspTransport;

fn transport_error(e: impl core::fmt::Debug) -> TransportError {
    TransportError::new(format!("{e:?}"))
}

impl HttpTransport for EspTransport {
    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let connection = EspHttpConnection::new(&Configuration {
            timeout: request.timeout,
            ..Default::default()
        })
        .map_err(transport_error)?;
        let mut client = HttpClient::wrap(connection);

        let method = match request.method {
            RequestMethod::Get => Method::Get,
            RequestMethod::Post => Method::Post,
        };

        // Content-Length goes out with the body.
        let length = request.body.map(|body| body.len().to_string());
        let mut headers: Vec<(&str, &str)> = request.headers.to_vec();
        if let Some(length) = &length {
            headers.push(("Content-Length", length.as_str()));
        }

        let mut outgoing = client
            .request(method, request.url, &headers)
            .map_err(transport_error)?;
        info!("-> {:?} {}", request.method, request.url);
        if let Some(body) = request.body {
            outgoing.write_all(body).map_err(transport_error)?;
            outgoing.flush().map_err(transport_error)?;
        }
        let mut response = outgoing.submit().map_err(transport_error)?;

        let status = response.status();
        info!("<- {}", status);

        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let read = response.read(&mut buf).map_err(transport_error)?;
            if read == 0 || body.len() >= MAX_BODY {
                break;
            }
            body.extend_from_slice(&buf[..read]);
        }
        body.truncate(MAX_BODY);

        Ok(HttpResponse { status, body })
    }
}
