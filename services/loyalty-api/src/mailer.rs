use async_trait::async_trait;
use loyalty_core::{
    external::{Notifier, WELCOME_TEMPLATE},
    Error, Result,
};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    html: String,
}

/// Posts rendered mails to an HTTP mail relay
pub struct WebhookMailer {
    relay_url: String,
    from: String,
    client: Client,
}

impl WebhookMailer {
    pub fn new(relay_url: String, from: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Mail client: {}", e)))?;

        Ok(Self {
            relay_url,
            from,
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookMailer {
    async fn notify(&self, recipient: &str, template: &str, data: serde_json::Value) -> Result<()> {
        let (subject, html) = render(template, &data)?;
        let message = MailMessage {
            from: &self.from,
            to: recipient,
            subject,
            html,
        };

        let response = self
            .client
            .post(&self.relay_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| Error::External(format!("Mail relay request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Mail relay returned {}",
                response.status()
            )));
        }

        info!(template = template, "Mail sent");
        Ok(())
    }
}

/// Subject and HTML body for `template`
fn render(template: &str, data: &serde_json::Value) -> Result<(String, String)> {
    match template {
        WELCOME_TEMPLATE => {
            let name = data.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            Ok((
                "Welcome".to_string(),
                format!("<h2>Welcome, {}!</h2>", escape_html(name)),
            ))
        }
        other => Err(Error::External(format!("Unknown mail template: {}", other))),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
