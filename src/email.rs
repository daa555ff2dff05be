//! Outbound email: brief-submission notifications and follow-up check-ins,
//! sent over SMTP via lettre.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{message::header::ContentType, Message, SmtpTransport, Transport};

use crate::error::EmailError;

const SMTP_HOST: &str = "smtp.gmail.com";
const SMTP_PORT: u16 = 587;
/// Socket/greeting timeout. Outbound SMTP on hosted platforms stalls hard
/// when IPv6 routes are broken, so keep this short.
const SMTP_TIMEOUT_SECS: u64 = 15;

/// SMTP sender configuration.
#[derive(Debug, Clone)]
pub struct EmailSender {
    username: String,
    password: String,
    from_address: String,
}

impl EmailSender {
    /// Build from credentials; `None` when either credential is absent.
    pub fn from_config(user: Option<&str>, pass: Option<&str>) -> Option<Self> {
        let username = user?.to_string();
        let password = pass?.to_string();
        let from_address = username.clone();
        Some(Self {
            username,
            password,
            from_address,
        })
    }

    fn build_transport(&self) -> Result<SmtpTransport, EmailError> {
        Ok(SmtpTransport::relay(SMTP_HOST)
            .map_err(|e| EmailError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(SMTP_PORT)
            .credentials(Credentials::new(
                self.username.clone(),
                self.password.clone(),
            ))
            .timeout(Some(std::time::Duration::from_secs(SMTP_TIMEOUT_SECS)))
            .build())
    }

    /// Send one HTML email. The blocking lettre transport runs on the
    /// blocking pool.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| EmailError::InvalidAddress(format!("from: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| EmailError::InvalidAddress(format!("to: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| EmailError::SendFailed(format!("build: {e}")))?;

        let transport = self.build_transport()?;
        let result = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| EmailError::SendFailed(format!("join: {e}")))?;

        result
            .map(|_| ())
            .map_err(|e| EmailError::SendFailed(e.to_string()))
    }
}

/// Follow-up kinds, matching `follow_ups.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpKind {
    SevenDay,
    ThirtyDay,
}

impl FollowUpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FollowUpKind::SevenDay => "7day",
            FollowUpKind::ThirtyDay => "30day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "7day" => Some(FollowUpKind::SevenDay),
            "30day" => Some(FollowUpKind::ThirtyDay),
            _ => None,
        }
    }
}

/// Tracking pixel URL for a follow-up email.
pub fn tracking_pixel_url(base_url: &str, tracking_id: &str) -> String {
    format!(
        "{}/follow-up/track/{}",
        base_url.trim_end_matches('/'),
        tracking_id
    )
}

/// Subject and HTML body for the brief-submission notification.
pub fn submission_email(
    venue_name: &str,
    contact_name: &str,
    contact_email: &str,
    summary_html: &str,
    approval_url: Option<&str>,
    schedule_prebuilt: bool,
) -> (String, String) {
    let subject = format!("New music brief: {venue_name}");

    let mut body = format!(
        "<h2>New music brief submitted</h2>\
         <p><strong>Venue:</strong> {venue_name}<br>\
         <strong>Contact:</strong> {contact_name} &lt;{contact_email}&gt;</p>\
         {summary_html}"
    );
    if schedule_prebuilt {
        body.push_str(
            "<p style=\"background:#e6ffe6;padding:8px\">\
             ✅ Schedule pre-built on the platform — approval will activate it.</p>",
        );
    }
    if let Some(url) = approval_url {
        body.push_str(&format!(
            "<p><a href=\"{url}\" style=\"background:#1a73e8;color:#fff;\
             padding:10px 18px;text-decoration:none\">Review &amp; activate schedule</a></p>"
        ));
    }
    (subject, body)
}

/// Subject and HTML body for a follow-up email, with the open-tracking pixel.
pub fn followup_email(
    kind: FollowUpKind,
    venue_name: &str,
    contact_name: &str,
    base_url: &str,
    tracking_id: &str,
) -> (String, String) {
    let pixel = tracking_pixel_url(base_url, tracking_id);
    let greeting = if contact_name.is_empty() {
        "Hello".to_string()
    } else {
        format!("Hello {contact_name}")
    };

    let (subject, lead) = match kind {
        FollowUpKind::SevenDay => (
            format!("How is the music at {venue_name}?"),
            "It has been a week since your new soundtrack went live. \
             How is it landing with your guests?",
        ),
        FollowUpKind::ThirtyDay => (
            format!("Time to refresh the sound at {venue_name}?"),
            "A month in is a great moment to rotate playlists and keep the \
             atmosphere fresh. Want us to put together a seasonal update?",
        ),
    };

    let body = format!(
        "<p>{greeting},</p><p>{lead}</p>\
         <p>Just reply to this email and we will take it from there.</p>\
         <p>— The BMAsia music design team</p>\
         <img src=\"{pixel}\" width=\"1\" height=\"1\" alt=\"\">"
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_requires_both_credentials() {
        assert!(EmailSender::from_config(Some("u@example.com"), None).is_none());
        assert!(EmailSender::from_config(None, Some("pw")).is_none());
        assert!(EmailSender::from_config(Some("u@example.com"), Some("pw")).is_some());
    }

    #[test]
    fn submission_email_includes_badge_and_link() {
        let (subject, body) = submission_email(
            "Sky Bar",
            "Nok",
            "nok@example.com",
            "<p>3 dayparts</p>",
            Some("https://app.example.com/approve/abc"),
            true,
        );
        assert!(subject.contains("Sky Bar"));
        assert!(body.contains("pre-built"));
        assert!(body.contains("/approve/abc"));
    }

    #[test]
    fn followup_email_embeds_tracking_pixel() {
        let (_, body) = followup_email(
            FollowUpKind::SevenDay,
            "Sky Bar",
            "Nok",
            "https://app.example.com/",
            "track-123",
        );
        assert!(body.contains("https://app.example.com/follow-up/track/track-123"));
        assert!(body.contains("width=\"1\""));
    }

    #[test]
    fn followup_kind_roundtrip() {
        assert_eq!(FollowUpKind::parse("7day"), Some(FollowUpKind::SevenDay));
        assert_eq!(FollowUpKind::parse("30day"), Some(FollowUpKind::ThirtyDay));
        assert_eq!(FollowUpKind::parse("90day"), None);
        assert_eq!(FollowUpKind::SevenDay.as_str(), "7day");
    }
}
