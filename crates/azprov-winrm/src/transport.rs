//! WS-Management over HTTPS: just enough of the protocol to open a cmd
//! shell, run one command in it, drain its output and close it again.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use base64::Engine;
use log::{debug, error, trace, warn};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::types::*;

/// Upper bound on requests per exchange: re-authenticating a dropped
/// connection takes three.
const MAX_AUTH_ROUNDS: usize = 3;

/// HTTP connection to one WinRM listener and the shells opened through it.
pub struct WinRmTransport {
    client: reqwest::Client,
    endpoint: String,
    auth: Option<Box<dyn AuthProvider>>,
    /// The pooled connection passed a connection-oriented handshake
    session: bool,
    /// ISO 8601, sent with every request
    operation_timeout: String,
    idle_timeout_sec: u32,
    /// Bound on output collection for one command
    command_timeout: Duration,
    locale: String,
    /// Shells not yet deleted
    active_shells: Vec<String>,
    sent: u64,
}

impl WinRmTransport {
    /// Only `https` endpoints are accepted. Every certificate in
    /// `trusted_certificates` is added as an extra root.
    pub fn new(config: &WinRmConfig) -> WinRmResult<Self> {
        let url = Url::parse(&config.endpoint).map_err(|e| {
            WinRmError::new(
                WinRmErrorKind::Config,
                format!("Invalid endpoint '{}': {}", config.endpoint, e),
            )
        })?;
        if url.scheme() != "https" {
            return Err(WinRmError::new(
                WinRmErrorKind::Config,
                format!("Endpoint must use https, got '{}'", url.scheme()),
            ));
        }

        // The HTTP timeout must outlast a Receive that waits the full
        // operation timeout on the server.
        let http_timeout = u64::from(config.operation_timeout_sec) + 30;
        let mut client_builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(http_timeout))
            .connect_timeout(Duration::from_secs(u64::from(config.open_timeout_sec)))
            // NTLM authenticates one HTTP/1.1 connection
            .http1_only()
            .pool_max_idle_per_host(1);

        for der in &config.trusted_certificates {
            let cert = reqwest::Certificate::from_der(der).map_err(|e| {
                WinRmError::new(
                    WinRmErrorKind::Config,
                    format!("Invalid trusted certificate: {}", e),
                )
            })?;
            client_builder = client_builder.add_root_certificate(cert);
        }

        let client = client_builder.build().map_err(|e| {
            WinRmError::new(
                WinRmErrorKind::Config,
                format!("Failed to build HTTP client: {}", e),
            )
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            auth: None,
            session: false,
            operation_timeout: config.operation_timeout(),
            idle_timeout_sec: config.idle_timeout_sec,
            command_timeout: Duration::from_secs(config.command_timeout_sec),
            locale: config.culture.clone(),
            active_shells: Vec::new(),
            sent: 0,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Authenticate every following request with `auth`.
    pub fn authenticate(&mut self, auth: Box<dyn AuthProvider>) -> WinRmResult<()> {
        if auth.requires_https() && !self.endpoint.starts_with("https://") {
            return Err(WinRmError::new(
                WinRmErrorKind::Config,
                format!("{} authentication requires HTTPS", auth.name()),
            ));
        }
        debug!("Using {} authentication for {}", auth.name(), self.endpoint);
        self.auth = Some(auth);
        self.session = false;
        Ok(())
    }

    pub fn active_shells(&self) -> &[String] {
        &self.active_shells
    }

    /// POST a SOAP envelope, answering authentication challenges, and
    /// return the final HTTP status with the body.
    async fn post(&mut self, soap_body: &str) -> WinRmResult<(StatusCode, String)> {
        self.sent += 1;
        let req_id = self.sent;
        debug!(
            "WinRM request #{} to {} ({} bytes)",
            req_id,
            self.endpoint,
            soap_body.len()
        );

        let client = &self.client;
        let endpoint = self.endpoint.as_str();
        let reply = exchange(self.auth.as_mut(), &mut self.session, |authorization| {
            send_request(client, endpoint, soap_body, authorization)
        })
        .await?;

        trace!(
            "WinRM response #{}: status={}, body:\n{}",
            req_id,
            reply.status,
            reply.body
        );
        Ok((reply.status, reply.body))
    }

    /// Send a raw SOAP envelope and return the response body.
    pub async fn send_message(&mut self, soap_body: &str) -> WinRmResult<String> {
        let (status, body) = self.post(soap_body).await?;
        if status.is_success() {
            return Ok(body);
        }
        Err(fault_error(status, &body))
    }

    /// Envelope addressed to this endpoint with a fresh message id.
    fn envelope(&self, action: WsManAction) -> Envelope<'_> {
        Envelope::new(action, &self.endpoint, &self.operation_timeout)
    }

    // ─── Shell lifecycle ─────────────────────────────────────────────────

    pub async fn create_shell(&mut self) -> WinRmResult<String> {
        let body = format!(
            "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams>\
             <rsp:OutputStreams>stdout stderr</rsp:OutputStreams>\
             <rsp:IdleTimeOut>PT{}S</rsp:IdleTimeOut></rsp:Shell>",
            self.idle_timeout_sec
        );
        let envelope = self
            .envelope(WsManAction::Create)
            .locale(&self.locale)
            .option("WINRS_NOPROFILE", "TRUE")
            .option("WINRS_CODEPAGE", "65001")
            .render(&body);

        let response = self.send_message(&envelope).await?;
        let shell_id = extract_shell_id(&response).ok_or_else(|| {
            WinRmError::new(WinRmErrorKind::Protocol, "Create response has no ShellId")
        })?;
        debug!("Opened shell {} on {}", shell_id, self.endpoint);
        self.active_shells.push(shell_id.clone());
        Ok(shell_id)
    }

    pub async fn delete_shell(&mut self, shell_id: &str) -> WinRmResult<()> {
        let envelope = self.envelope(WsManAction::Delete).shell(shell_id).render("");
        self.send_message(&envelope).await?;
        self.active_shells.retain(|id| id != shell_id);
        debug!("Closed shell {}", shell_id);
        Ok(())
    }

    // ─── Commands ────────────────────────────────────────────────────────

    /// Start `command` in the shell; returns the command id.
    pub async fn execute_command(
        &mut self,
        shell_id: &str,
        command: &str,
        arguments: &[String],
    ) -> WinRmResult<String> {
        let args: String = arguments
            .iter()
            .map(|a| format!("<rsp:Arguments>{}</rsp:Arguments>", xml_escape(a)))
            .collect();
        let body = format!(
            "<rsp:CommandLine><rsp:Command>{}</rsp:Command>{}</rsp:CommandLine>",
            xml_escape(command),
            args
        );
        let envelope = self
            .envelope(WsManAction::Command)
            .shell(shell_id)
            .render(&body);

        let response = self.send_message(&envelope).await?;
        let command_id = extract_command_id(&response).ok_or_else(|| {
            WinRmError::new(WinRmErrorKind::Protocol, "Command response has no CommandId")
        })?;
        debug!("Command {} started in shell {}", command_id, shell_id);
        Ok(command_id)
    }

    /// Run a PowerShell script through `powershell.exe -EncodedCommand`.
    pub async fn execute_ps_command(&mut self, shell_id: &str, script: &str) -> WinRmResult<String> {
        let args: Vec<String> = ["-NoProfile", "-NonInteractive", "-EncodedCommand"]
            .into_iter()
            .map(String::from)
            .chain(std::iter::once(encode_ps_command(script)))
            .collect();
        self.execute_command(shell_id, "powershell.exe", &args).await
    }

    /// One Receive round trip. A server-side operation timeout yields an
    /// empty, unfinished chunk.
    pub async fn receive_output(
        &mut self,
        shell_id: &str,
        command_id: &str,
    ) -> WinRmResult<ReceiveChunk> {
        let body = format!(
            r#"<rsp:Receive><rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream></rsp:Receive>"#,
            xml_escape(command_id)
        );
        let envelope = self
            .envelope(WsManAction::Receive)
            .shell(shell_id)
            .render(&body);

        let (status, body) = self.post(&envelope).await?;
        if status.is_success() {
            return Ok(parse_receive_response(&body));
        }
        if body.contains(RECEIVE_TIMED_OUT_CODE) {
            trace!("Receive for {} timed out with no output", command_id);
            return Ok(ReceiveChunk::default());
        }
        Err(fault_error(status, &body))
    }

    /// Poll Receive until the command reports Done or the command timeout
    /// passes.
    pub async fn receive_all_output(
        &mut self,
        shell_id: &str,
        command_id: &str,
    ) -> WinRmResult<CommandOutput> {
        let deadline = Instant::now() + self.command_timeout;
        let mut output = CommandOutput::default();

        loop {
            let chunk = self.receive_output(shell_id, command_id).await?;
            output.stdout.push_str(&chunk.stdout);
            output.stderr.push_str(&chunk.stderr);

            if chunk.done {
                output.exit_code = final_exit_code(&chunk, command_id)?;
                return Ok(output);
            }
            if Instant::now() >= deadline {
                return Err(WinRmError::new(
                    WinRmErrorKind::Timeout,
                    format!(
                        "Command {} did not finish within {}s",
                        command_id,
                        self.command_timeout.as_secs()
                    ),
                ));
            }
        }
    }

    pub async fn signal_command(
        &mut self,
        shell_id: &str,
        command_id: &str,
        signal_code: &str,
    ) -> WinRmResult<()> {
        let body = format!(
            r#"<rsp:Signal CommandId="{}"><rsp:Code>{}</rsp:Code></rsp:Signal>"#,
            xml_escape(command_id),
            signal_code
        );
        let envelope = self
            .envelope(WsManAction::Signal)
            .shell(shell_id)
            .render(&body);
        self.send_message(&envelope).await?;
        trace!("Signal {} delivered to {}", signal_code, command_id);
        Ok(())
    }

    /// Delete every shell still open; returns one message per failure.
    pub async fn cleanup(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        for shell_id in std::mem::take(&mut self.active_shells) {
            if let Err(e) = self.delete_shell(&shell_id).await {
                warn!("Shell {} left open: {}", shell_id, e);
                failures.push(format!("{}: {}", shell_id, e));
            }
        }
        failures
    }
}

impl fmt::Debug for WinRmTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WinRmTransport")
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth.as_ref().map(|a| a.name().to_string()))
            .field("session", &self.session)
            .field("active_shells", &self.active_shells)
            .finish()
    }
}

/// One HTTP round trip.
#[derive(Debug)]
struct Reply {
    status: StatusCode,
    /// `WWW-Authenticate` values
    challenges: Vec<String>,
    body: String,
}

async fn send_request(
    client: &reqwest::Client,
    endpoint: &str,
    soap_body: &str,
    authorization: Option<String>,
) -> WinRmResult<Reply> {
    let mut request = client
        .post(endpoint)
        .header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/soap+xml;charset=UTF-8"),
        )
        .body(soap_body.to_string());
    if let Some(value) = authorization {
        let value = HeaderValue::from_str(&value).map_err(|e| {
            WinRmError::new(WinRmErrorKind::Config, format!("Invalid auth header: {}", e))
        })?;
        request = request.header(AUTHORIZATION, value);
    }

    let response = request.send().await.map_err(|e| {
        WinRmError::new(
            WinRmErrorKind::Transport,
            format!("WinRM HTTP request failed: {}", e),
        )
    })?;

    let status = response.status();
    let challenges = response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    let body = response.text().await.map_err(|e| {
        WinRmError::new(
            WinRmErrorKind::Transport,
            format!("Failed to read WinRM response body: {}", e),
        )
    })?;
    Ok(Reply {
        status,
        challenges,
        body,
    })
}

/// Send one message through `send`, answering 401 challenges.
///
/// A connection-oriented provider sends no header once `session` is set.
/// A 401 on such a connection restarts the handshake. A 401 the provider
/// cannot answer is returned as is.
async fn exchange<F, Fut>(
    auth: Option<&mut Box<dyn AuthProvider>>,
    session: &mut bool,
    mut send: F,
) -> WinRmResult<Reply>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = WinRmResult<Reply>>,
{
    let Some(auth) = auth else {
        return send(None).await;
    };

    let mut header = if auth.connection_oriented() && *session {
        None
    } else {
        Some(auth.initial_header()?)
    };

    for _ in 0..MAX_AUTH_ROUNDS {
        let reply = send(header.clone()).await?;
        if reply.status != StatusCode::UNAUTHORIZED {
            *session = auth.connection_oriented();
            return Ok(reply);
        }
        *session = false;
        header = match header {
            None => {
                debug!("{} session lost, authenticating again", auth.name());
                Some(auth.initial_header()?)
            }
            Some(_) => match auth.process_challenge(&reply.challenges)? {
                Some(next) => Some(next),
                None => return Ok(reply),
            },
        };
    }

    Err(WinRmError::with_status(
        WinRmErrorKind::Auth,
        format!("{} authentication did not complete", auth.name()),
        StatusCode::UNAUTHORIZED.as_u16(),
    ))
}

/// Exit code of a finished command; Done without one is malformed.
fn final_exit_code(chunk: &ReceiveChunk, command_id: &str) -> WinRmResult<i32> {
    chunk.exit_code.ok_or_else(|| {
        WinRmError::new(
            WinRmErrorKind::Protocol,
            format!("Command {} finished without an exit code", command_id),
        )
    })
}

fn fault_error(status: StatusCode, body: &str) -> WinRmError {
    let fault = parse_soap_fault(body).unwrap_or_else(|| body.to_string());
    error!("WinRM request failed: {} - {}", status, fault);
    let kind = if status == StatusCode::UNAUTHORIZED {
        WinRmErrorKind::Auth
    } else {
        WinRmErrorKind::Fault
    };
    WinRmError::with_status(kind, format!("HTTP {}: {}", status, fault), status.as_u16())
}

/// Encode a script as UTF-16LE base64, as `-EncodedCommand` expects.
pub fn encode_ps_command(script: &str) -> String {
    let utf16: Vec<u8> = script
        .encode_utf16()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(utf16)
}

// ─── Envelopes ───────────────────────────────────────────────────────────────

const ANONYMOUS_REPLY_TO: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";
const MAX_ENVELOPE_SIZE: u32 = 153_600;

/// One WS-Management request against the cmd shell resource.
struct Envelope<'a> {
    action: WsManAction,
    to: &'a str,
    timeout: &'a str,
    message_id: String,
    shell_id: Option<&'a str>,
    locale: Option<&'a str>,
    options: Vec<(&'static str, &'static str)>,
}

impl<'a> Envelope<'a> {
    fn new(action: WsManAction, to: &'a str, timeout: &'a str) -> Self {
        Self {
            action,
            to,
            timeout,
            message_id: Uuid::new_v4().to_string(),
            shell_id: None,
            locale: None,
            options: Vec::new(),
        }
    }

    fn shell(mut self, shell_id: &'a str) -> Self {
        self.shell_id = Some(shell_id);
        self
    }

    fn locale(mut self, locale: &'a str) -> Self {
        self.locale = Some(locale);
        self
    }

    fn option(mut self, name: &'static str, value: &'static str) -> Self {
        self.options.push((name, value));
        self
    }

    fn header(&self) -> String {
        let mut h = String::from("<s:Header>");
        h.push_str(&format!("<a:To>{}</a:To>", xml_escape(self.to)));
        h.push_str(&format!(
            r#"<a:Action s:mustUnderstand="true">{}</a:Action>"#,
            self.action.uri()
        ));
        h.push_str(&format!(
            r#"<w:ResourceURI s:mustUnderstand="true">{}</w:ResourceURI>"#,
            WsManResourceUri::SHELL
        ));
        h.push_str(&format!("<a:MessageID>uuid:{}</a:MessageID>", self.message_id));
        h.push_str(&format!(
            r#"<a:ReplyTo><a:Address s:mustUnderstand="true">{}</a:Address></a:ReplyTo>"#,
            ANONYMOUS_REPLY_TO
        ));
        h.push_str(&format!(
            r#"<w:MaxEnvelopeSize s:mustUnderstand="true">{}</w:MaxEnvelopeSize>"#,
            MAX_ENVELOPE_SIZE
        ));
        h.push_str(&format!("<w:OperationTimeout>{}</w:OperationTimeout>", self.timeout));
        if let Some(locale) = self.locale {
            h.push_str(&format!(
                r#"<w:Locale xml:lang="{}" s:mustUnderstand="false"/>"#,
                xml_escape(locale)
            ));
        }
        if let Some(shell_id) = self.shell_id {
            h.push_str(&format!(
                r#"<w:SelectorSet><w:Selector Name="ShellId">{}</w:Selector></w:SelectorSet>"#,
                xml_escape(shell_id)
            ));
        }
        if !self.options.is_empty() {
            h.push_str("<w:OptionSet>");
            for (name, value) in &self.options {
                h.push_str(&format!(r#"<w:Option Name="{}">{}</w:Option>"#, name, value));
            }
            h.push_str("</w:OptionSet>");
        }
        h.push_str("</s:Header>");
        h
    }

    fn render(&self, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="{}" xmlns:a="{}" xmlns:w="{}" xmlns:p="{}" xmlns:rsp="{}" xmlns:xsi="{}">{}<s:Body>{}</s:Body></s:Envelope>"#,
            WsManNamespace::SOAP,
            WsManNamespace::ADDRESSING,
            WsManNamespace::WSMAN,
            WsManNamespace::WSMAND,
            WsManNamespace::SHELL,
            WsManNamespace::XMLSCHEMA_INST,
            self.header(),
            body
        )
    }
}

// ─── Response Parsers ────────────────────────────────────────────────────────

/// Text content of the first `<{tag}>` element.
fn element_text<'a>(response: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let start = response.find(&open)? + open.len();
    let end = response[start..].find('<')?;
    Some(response[start..start + end].trim())
}

/// Value of the first `{attr}="..."` attribute.
fn attribute_value<'a>(response: &'a str, attr: &str) -> Option<&'a str> {
    let pattern = format!("{}=\"", attr);
    let start = response.find(&pattern)? + pattern.len();
    let end = response[start..].find('"')?;
    Some(&response[start..start + end])
}

/// Extract the ShellId from a Create response.
fn extract_shell_id(response: &str) -> Option<String> {
    element_text(response, "rsp:ShellId")
        .or_else(|| {
            response
                .find(r#"<w:Selector Name="ShellId">"#)
                .and_then(|pos| element_text(&response[pos..], r#"w:Selector Name="ShellId""#))
        })
        .or_else(|| attribute_value(response, "ShellId"))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract the CommandId from a Command response.
fn extract_command_id(response: &str) -> Option<String> {
    element_text(response, "rsp:CommandId")
        .or_else(|| attribute_value(response, "CommandId"))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a Receive response: stream data, completion and exit code.
pub fn parse_receive_response(response: &str) -> ReceiveChunk {
    let mut chunk = ReceiveChunk::default();

    extract_stream_data(response, "stdout", &mut chunk.stdout);
    extract_stream_data(response, "stderr", &mut chunk.stderr);

    chunk.done = response.contains(
        "State=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done\"",
    ) || response.contains("CommandState State=\"Done\"");

    chunk.exit_code = element_text(response, "rsp:ExitCode").and_then(|s| s.parse().ok());
    chunk
}

/// Extract base64-encoded stream data and decode it.
fn extract_stream_data(response: &str, stream_name: &str, output: &mut String) {
    let pattern = format!("Name=\"{}\"", stream_name);
    let mut search_from = 0;

    while let Some(attr_pos) = response[search_from..].find(&pattern) {
        let abs_pos = search_from + attr_pos;
        let Some(gt_pos) = response[abs_pos..].find('>') else {
            break;
        };
        // self-closing <rsp:Stream .../> carries no data
        if response[..abs_pos + gt_pos].ends_with('/') {
            search_from = abs_pos + gt_pos + 1;
            continue;
        }
        let data_start = abs_pos + gt_pos + 1;
        let Some(end_pos) = response[data_start..].find("</rsp:Stream>") else {
            break;
        };
        let encoded = response[data_start..data_start + end_pos].trim();
        if !encoded.is_empty() {
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) {
                output.push_str(&String::from_utf8_lossy(&decoded));
            }
        }
        search_from = data_start + end_pos;
    }
}

/// Parse a SOAP fault from a WinRM error response.
pub fn parse_soap_fault(response: &str) -> Option<String> {
    // wsmanfault message
    if let Some(msg) = element_text(response, "f:Message") {
        if !msg.is_empty() {
            return Some(msg.to_string());
        }
    }
    // <s:Text> in Fault
    if let Some(start) = response.find("<s:Text") {
        if let Some(gt) = response[start..].find('>') {
            let text_start = start + gt + 1;
            if let Some(end) = response[text_start..].find("</s:Text>") {
                return Some(response[text_start..text_start + end].trim().to_string());
            }
        }
    }
    element_text(response, "faultstring").map(str::to_string)
}

/// XML-escape a string for inclusion in SOAP envelopes.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BasicAuth, NegotiateAuth};
    use crate::ntlm::challenge_message;

    const ENDPOINT: &str = "https://svc.cloudapp.net:61234/wsman";

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn transport_requires_https() {
        let e = WinRmTransport::new(&WinRmConfig::new("http://host:5985/wsman")).unwrap_err();
        assert_eq!(e.kind, WinRmErrorKind::Config);
        let e = WinRmTransport::new(&WinRmConfig::new("not a url")).unwrap_err();
        assert_eq!(e.kind, WinRmErrorKind::Config);
    }

    #[test]
    fn transport_rejects_garbage_certificate() {
        let mut cfg = WinRmConfig::new(ENDPOINT);
        cfg.trusted_certificates.push(vec![0x01, 0x02, 0x03]);
        let e = WinRmTransport::new(&cfg).unwrap_err();
        assert_eq!(e.kind, WinRmErrorKind::Config);
    }

    #[test]
    fn transport_stores_provider() {
        let mut t = WinRmTransport::new(&WinRmConfig::new(ENDPOINT)).unwrap();
        assert_eq!(t.endpoint(), ENDPOINT);
        t.authenticate(Box::new(NegotiateAuth::new(&WinRmCredential::new("user", "pass"))))
            .unwrap();
        assert_eq!(t.auth.as_ref().map(|a| a.name()), Some("Negotiate"));
        assert!(!t.session);
        assert!(t.active_shells().is_empty());
        assert!(format!("{:?}", t).contains("Negotiate"));
    }

    fn reply(status: StatusCode, challenges: &[String]) -> Reply {
        Reply {
            status,
            challenges: challenges.to_vec(),
            body: String::new(),
        }
    }

    fn ntlm_challenge() -> String {
        format!(
            "Negotiate {}",
            b64_bytes(&challenge_message(0, [7; 8], &[0, 0, 0, 0]))
        )
    }

    fn b64_bytes(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    /// Run `exchange` against scripted replies; returns the result and the
    /// authorization header of every request sent.
    async fn scripted(
        auth: &mut Box<dyn AuthProvider>,
        session: &mut bool,
        replies: Vec<Reply>,
    ) -> (WinRmResult<Reply>, Vec<Option<String>>) {
        let mut replies = replies.into_iter();
        let mut sent = Vec::new();
        let result = exchange(Some(auth), session, |header| {
            sent.push(header);
            let next = replies.next();
            async move {
                next.ok_or_else(|| WinRmError::new(WinRmErrorKind::Transport, "no more replies"))
            }
        })
        .await;
        (result, sent)
    }

    #[tokio::test]
    async fn negotiate_handshake_answers_challenge() {
        let mut auth: Box<dyn AuthProvider> =
            Box::new(NegotiateAuth::new(&WinRmCredential::new("azureuser", "pw")));
        let mut session = false;
        let (result, sent) = scripted(
            &mut auth,
            &mut session,
            vec![
                reply(StatusCode::UNAUTHORIZED, &[ntlm_challenge()]),
                reply(StatusCode::OK, &[]),
            ],
        )
        .await;

        assert_eq!(result.unwrap().status, StatusCode::OK);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].as_deref().unwrap().starts_with("Negotiate TlRMTVNTUAABAAAA"));
        assert!(sent[1].as_deref().unwrap().starts_with("Negotiate TlRMTVNTUAADAAAA"));
        assert!(session);

        // the authenticated connection carries later requests bare
        let (result, sent) = scripted(&mut auth, &mut session, vec![reply(StatusCode::OK, &[])]).await;
        assert!(result.is_ok());
        assert_eq!(sent, vec![None]);
    }

    #[tokio::test]
    async fn lost_session_authenticates_again() {
        let mut auth: Box<dyn AuthProvider> =
            Box::new(NegotiateAuth::new(&WinRmCredential::new("azureuser", "pw")));
        let mut session = true;
        let (result, sent) = scripted(
            &mut auth,
            &mut session,
            vec![
                reply(StatusCode::UNAUTHORIZED, &["Negotiate".to_string()]),
                reply(StatusCode::UNAUTHORIZED, &[ntlm_challenge()]),
                reply(StatusCode::OK, &[]),
            ],
        )
        .await;
        assert_eq!(result.unwrap().status, StatusCode::OK);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], None);
        assert!(sent[1].as_deref().unwrap().contains("TlRMTVNTUAAB"));
        assert!(sent[2].as_deref().unwrap().contains("TlRMTVNTUAAD"));
        assert!(session);
    }

    #[tokio::test]
    async fn rejected_credentials_return_the_401() {
        let mut auth: Box<dyn AuthProvider> =
            Box::new(NegotiateAuth::new(&WinRmCredential::new("azureuser", "wrong")));
        let mut session = false;
        let (result, sent) = scripted(
            &mut auth,
            &mut session,
            vec![
                reply(StatusCode::UNAUTHORIZED, &[ntlm_challenge()]),
                reply(StatusCode::UNAUTHORIZED, &["Negotiate".to_string()]),
            ],
        )
        .await;
        let reply = result.unwrap();
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(sent.len(), 2);
        assert!(!session);
        assert_eq!(fault_error(reply.status, &reply.body).kind, WinRmErrorKind::Auth);
    }

    #[tokio::test]
    async fn basic_is_sent_with_every_request() {
        let mut auth: Box<dyn AuthProvider> =
            Box::new(BasicAuth::new(&WinRmCredential::new("user", "pass")));
        let mut session = false;
        for _ in 0..2 {
            let (result, sent) =
                scripted(&mut auth, &mut session, vec![reply(StatusCode::OK, &[])]).await;
            assert!(result.is_ok());
            assert_eq!(sent, vec![Some("Basic dXNlcjpwYXNz".to_string())]);
        }
        assert!(!session);

        let (result, sent) = scripted(
            &mut auth,
            &mut session,
            vec![reply(StatusCode::UNAUTHORIZED, &["Negotiate".to_string()])],
        )
        .await;
        assert_eq!(result.unwrap().status, StatusCode::UNAUTHORIZED);
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn done_without_exit_code_is_protocol_error() {
        let chunk = ReceiveChunk {
            done: true,
            ..Default::default()
        };
        let e = final_exit_code(&chunk, "CMD-1").unwrap_err();
        assert_eq!(e.kind, WinRmErrorKind::Protocol);
        assert!(e.message.contains("CMD-1"));

        let chunk = ReceiveChunk {
            done: true,
            exit_code: Some(3),
            ..Default::default()
        };
        assert_eq!(final_exit_code(&chunk, "CMD-1").unwrap(), 3);
    }

    #[test]
    fn encoded_command_is_utf16le() {
        // "ab" → 61 00 62 00
        assert_eq!(encode_ps_command("ab"), "YQBiAA==");
    }

    #[test]
    fn envelope_header_fields() {
        let env = Envelope::new(WsManAction::Create, ENDPOINT, "PT60S")
            .locale("en-US")
            .option("WINRS_CODEPAGE", "65001")
            .render("<rsp:Shell/>");
        assert!(env.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope"#));
        assert!(env.contains(WsManAction::Create.uri()));
        assert!(env.contains(&format!("<a:To>{}</a:To>", ENDPOINT)));
        assert!(env.contains("<a:MessageID>uuid:"));
        assert!(env.contains("<w:OperationTimeout>PT60S</w:OperationTimeout>"));
        assert!(env.contains(r#"<w:Locale xml:lang="en-US""#));
        assert!(env.contains(r#"<w:Option Name="WINRS_CODEPAGE">65001</w:Option>"#));
        assert!(!env.contains("SelectorSet"));
        assert!(env.contains("<s:Body><rsp:Shell/></s:Body>"));
        assert_eq!(env.matches("</s:Header>").count(), 1);
    }

    #[test]
    fn envelope_selects_shell_and_escapes() {
        let env = Envelope::new(WsManAction::Delete, ENDPOINT, "PT60S")
            .shell("SHELL<1>")
            .render("");
        assert!(env.contains(r#"<w:Selector Name="ShellId">SHELL&lt;1&gt;</w:Selector>"#));
        assert!(!env.contains("OptionSet"));
        assert!(env.contains("<s:Body></s:Body>"));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = Envelope::new(WsManAction::Receive, ENDPOINT, "PT60S");
        let b = Envelope::new(WsManAction::Receive, ENDPOINT, "PT60S");
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn shell_id_from_create_response() {
        let resp = r#"<s:Body><rsp:Shell><rsp:ShellId>ABC-123</rsp:ShellId></rsp:Shell></s:Body>"#;
        assert_eq!(extract_shell_id(resp).as_deref(), Some("ABC-123"));
        let resp = r#"<w:SelectorSet><w:Selector Name="ShellId">DEF-456</w:Selector></w:SelectorSet>"#;
        assert_eq!(extract_shell_id(resp).as_deref(), Some("DEF-456"));
        assert!(extract_shell_id("<s:Body/>").is_none());
    }

    #[test]
    fn command_id_from_command_response() {
        let resp = r#"<rsp:CommandResponse><rsp:CommandId>CMD-9</rsp:CommandId></rsp:CommandResponse>"#;
        assert_eq!(extract_command_id(resp).as_deref(), Some("CMD-9"));
    }

    #[test]
    fn receive_response_in_progress() {
        let resp = format!(
            r#"<rsp:ReceiveResponse>
  <rsp:Stream Name="stdout" CommandId="C">{}</rsp:Stream>
  <rsp:Stream Name="stderr" CommandId="C" End="true"/>
  <rsp:CommandState CommandId="C" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>
</rsp:ReceiveResponse>"#,
            b64("partial ")
        );
        let chunk = parse_receive_response(&resp);
        assert_eq!(chunk.stdout, "partial ");
        assert_eq!(chunk.stderr, "");
        assert!(!chunk.done);
        assert_eq!(chunk.exit_code, None);
    }

    #[test]
    fn receive_response_done_with_exit_code() {
        let resp = format!(
            r#"<rsp:ReceiveResponse>
  <rsp:Stream Name="stdout" CommandId="C">{}</rsp:Stream>
  <rsp:Stream Name="stdout" CommandId="C">{}</rsp:Stream>
  <rsp:Stream Name="stderr" CommandId="C">{}</rsp:Stream>
  <rsp:CommandState CommandId="C" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done">
    <rsp:ExitCode>1</rsp:ExitCode>
  </rsp:CommandState>
</rsp:ReceiveResponse>"#,
            b64("line1\n"),
            b64("line2\n"),
            b64("boom")
        );
        let chunk = parse_receive_response(&resp);
        assert_eq!(chunk.stdout, "line1\nline2\n");
        assert_eq!(chunk.stderr, "boom");
        assert!(chunk.done);
        assert_eq!(chunk.exit_code, Some(1));
    }

    #[test]
    fn soap_fault_messages() {
        let wsman = r#"<s:Fault><s:Reason><s:Text xml:lang="en-US">The request is invalid.</s:Text></s:Reason><s:Detail><f:WSManFault Code="5"><f:Message>Access is denied. </f:Message></f:WSManFault></s:Detail></s:Fault>"#;
        assert_eq!(parse_soap_fault(wsman).as_deref(), Some("Access is denied."));
        let text = r#"<s:Fault><s:Reason><s:Text xml:lang="en-US">The request is invalid.</s:Text></s:Reason></s:Fault>"#;
        assert_eq!(parse_soap_fault(text).as_deref(), Some("The request is invalid."));
        assert_eq!(
            parse_soap_fault("<faultstring>bad</faultstring>").as_deref(),
            Some("bad")
        );
        assert!(parse_soap_fault("<html/>").is_none());
    }

    #[test]
    fn fault_error_kinds() {
        assert_eq!(fault_error(StatusCode::UNAUTHORIZED, "").kind, WinRmErrorKind::Auth);
        let e = fault_error(StatusCode::INTERNAL_SERVER_ERROR, "<faultstring>x</faultstring>");
        assert_eq!(e.kind, WinRmErrorKind::Fault);
        assert_eq!(e.status_code, Some(500));
    }

    #[test]
    fn escape_special_chars() {
        assert_eq!(xml_escape("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
    }
}
