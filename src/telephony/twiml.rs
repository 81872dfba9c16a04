//! TwiML call-control documents.

use std::fmt::Write;

/// A `<Stream>` noun inside `<Start>` or `<Connect>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    pub name: Option<String>,
    pub url: String,
    pub track: Option<String>,
    /// Rendered as nested `<Parameter name=".." value=".."/>` elements.
    pub parameters: Vec<(String, String)>,
}

impl Stream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    fn render(&self, out: &mut String) {
        out.push_str("<Stream");
        if let Some(name) = &self.name {
            attr(out, "name", name);
        }
        attr(out, "url", &self.url);
        if let Some(track) = &self.track {
            attr(out, "track", track);
        }

        if self.parameters.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for (name, value) in &self.parameters {
            out.push_str("<Parameter");
            attr(out, "name", name);
            attr(out, "value", value);
            out.push_str("/>");
        }
        out.push_str("</Stream>");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Say {
        voice: Option<String>,
        language: Option<String>,
        text: String,
    },
    Pause {
        length: u32,
    },
    Start(Stream),
    Connect(Stream),
}

/// Builder for a `<Response>` document.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, voice: Option<&str>, language: Option<&str>, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say {
            voice: voice.map(str::to_string),
            language: language.map(str::to_string),
            text: text.into(),
        });
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.verbs.push(Verb::Pause { length: seconds });
        self
    }

    /// Fork call audio to a stream while the call continues.
    pub fn start_stream(mut self, stream: Stream) -> Self {
        self.verbs.push(Verb::Start(stream));
        self
    }

    /// Hand the call over to a bidirectional stream.
    pub fn connect_stream(mut self, stream: Stream) -> Self {
        self.verbs.push(Verb::Connect(stream));
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            match verb {
                Verb::Say {
                    voice,
                    language,
                    text,
                } => {
                    out.push_str("<Say");
                    if let Some(voice) = voice {
                        attr(&mut out, "voice", voice);
                    }
                    if let Some(language) = language {
                        attr(&mut out, "language", language);
                    }
                    out.push('>');
                    escape_into(&mut out, text);
                    out.push_str("</Say>");
                }
                Verb::Pause { length } => {
                    let _ = write!(out, r#"<Pause length="{length}"/>"#);
                }
                Verb::Start(stream) => {
                    out.push_str("<Start>");
                    stream.render(&mut out);
                    out.push_str("</Start>");
                }
                Verb::Connect(stream) => {
                    out.push_str("<Connect>");
                    stream.render(&mut out);
                    out.push_str("</Connect>");
                }
            }
        }
        out.push_str("</Response>");
        out
    }
}

impl std::fmt::Display for VoiceResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(out, value);
    out.push('"');
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

/// Document returned from the `/voice` webhook: greet, pause, then stream
/// the caller's audio to the gateway bridge at `stream_url`.
pub fn voice_webhook_document(stream_url: &str) -> String {
    let stream = Stream::new(stream_url)
        .name("ai_stream")
        .track("inbound_track");

    VoiceResponse::new()
        .say(Some("alice"), None, "Please wait while we connect you.")
        .pause(3)
        .start_stream(stream.clone())
        .connect_stream(stream)
        .render()
}

/// Inline document for outbound calls that stream straight to the provider
/// with a browser-issued session token.
///
/// Fails when `provider_stream_url` cannot carry the token as a query parameter.
pub fn provider_call_document(
    provider_stream_url: &str,
    model: &str,
    session_token: &str,
) -> Result<String, url::ParseError> {
    let connect_url = url::Url::parse_with_params(
        provider_stream_url,
        &[("model", model), ("auth_token", session_token)],
    )?;

    Ok(VoiceResponse::new()
        .start_stream(
            Stream::new(provider_stream_url)
                .name("openai_stream")
                .track("both_tracks"),
        )
        .say(
            Some("alice"),
            Some("en-US"),
            "Connected to AI assistant. You can start speaking now.",
        )
        .connect_stream(
            Stream::new(connect_url)
                .name("openai_stream")
                .track("both_tracks")
                .parameter("model", model),
        )
        .pause(120)
        .render())
}
