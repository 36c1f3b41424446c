//! Email service for verification, password reset and newsletter welcome emails.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use md5::{Digest, Md5};
use std::path::Path;
use tracing::{info, instrument};

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
};

pub const VERIFICATION_SUBJECT: &str = "Verify your email - Magicians News";
pub const NEWSLETTER_SUBJECT: &str = "Welcome to Magicians News!";

pub struct EmailService {
    /// None when delivery is disabled; messages are logged instead
    transport: Option<EmailTransport>,
    from_email: String,
    from_name: String,
    frontend_url: String,
    backend_url: String,
    frontend_host: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// Subject line of a password reset email. The code makes every reset a distinct conversation in
/// mail clients that thread by subject.
pub fn password_reset_subject(code: &str) -> String {
    format!("Reset your password [{code}] - Magicians News")
}

/// Stable Message-ID for a reset code: resending the same code yields the same ID.
pub fn password_reset_message_id(code: &str, host: &str) -> String {
    format!("<reset-{}@{host}>", hex::encode(Md5::digest(code.as_bytes())))
}

/// Lowercased, trimmed form under which addresses are stored and looked up.
pub fn normalize_address(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Whether `email` is a syntactically valid mailbox address.
pub fn is_valid_address(email: &str) -> bool {
    email.parse::<lettre::Address>().is_ok_and(|address| address.domain().contains('.'))
}

fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = if !email_config.enabled {
            info!("Email delivery disabled, outgoing messages will be logged only");
            None
        } else {
            Some(match &email_config.transport {
                EmailTransportConfig::Smtp {
                    host,
                    port,
                    username,
                    password,
                    use_tls,
                } => {
                    if !use_tls {
                        tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                    }

                    let smtp_builder = if *use_tls {
                        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    } else {
                        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                    }
                    .map_err(|e| Error::Internal {
                        operation: format!("create SMTP transport: {e}"),
                    })?
                    .port(*port)
                    .credentials(Credentials::new(username.clone(), password.clone()));

                    EmailTransport::Smtp(smtp_builder.build())
                }
                EmailTransportConfig::File { path } => {
                    // Use file transport for development/testing
                    let emails_dir = Path::new(path);
                    if !emails_dir.exists() {
                        std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                            operation: format!("create emails directory: {e}"),
                        })?;
                    }
                    EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
                }
            })
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            frontend_url: config.frontend_base().to_string(),
            backend_url: config.backend_base().to_string(),
            frontend_host: config.frontend_host(),
        })
    }

    #[instrument(skip_all)]
    pub async fn send_verification_email(&self, to_email: &str, to_name: &str, token: &str) -> Result<(), Error> {
        let verify_link = format!("{}/verify-email?token={}", self.frontend_url, encode_query_value(token));
        let body = self.create_action_body(
            "Verify Your Email",
            to_name,
            "Thank you for signing up for Magicians News! Please verify your email address by clicking the button below:",
            &verify_link,
            "Verify Email",
            "This link will expire in 24 hours. If you didn't create an account, you can safely ignore this email.",
        );

        self.send_email("verification", to_email, VERIFICATION_SUBJECT, &body, None).await
    }

    #[instrument(skip_all)]
    pub async fn send_password_reset_email(&self, to_email: &str, to_name: &str, code: &str) -> Result<(), Error> {
        let reset_link = format!("{}/reset-password?token={}", self.frontend_url, encode_query_value(code));
        let body = self.create_action_body(
            "Reset Your Password",
            to_name,
            "We received a request to reset your password. Click the button below to choose a new password:",
            &reset_link,
            "Reset Password",
            "This link will expire in 1 hour. If you didn't request a password reset, you can safely ignore this email.",
        );
        let message_id = password_reset_message_id(code, &self.frontend_host);

        self.send_email("password_reset", to_email, &password_reset_subject(code), &body, Some(message_id))
            .await
    }

    #[instrument(skip_all)]
    pub async fn send_newsletter_confirmation(&self, to_email: &str, to_name: Option<&str>, unsubscribe_token: &str) -> Result<(), Error> {
        let unsubscribe_link = self.unsubscribe_link(unsubscribe_token);
        let body = self.create_newsletter_body(to_name, &unsubscribe_link);

        self.send_email("newsletter_welcome", to_email, NEWSLETTER_SUBJECT, &body, None).await
    }

    /// One-click unsubscribe link served by this API.
    pub fn unsubscribe_link(&self, unsubscribe_token: &str) -> String {
        format!(
            "{}/api/newsletter/unsubscribe?token={}",
            self.backend_url,
            encode_query_value(unsubscribe_token)
        )
    }

    async fn send_email(&self, kind: &'static str, to_email: &str, subject: &str, body: &str, message_id: Option<String>) -> Result<(), Error> {
        let Some(transport) = &self.transport else {
            info!(kind, to = %to_email, subject, "Email delivery disabled, not sending");
            return Ok(());
        };

        // Create from mailbox
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = to_email.parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .message_id(message_id)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        // Send based on transport type
        match transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        metrics::counter!("magnews_emails_sent_total", "kind" => kind).increment(1);
        Ok(())
    }

    fn create_action_body(&self, title: &str, to_name: &str, intro: &str, action_link: &str, action_label: &str, footer: &str) -> String {
        let name = escape_html(to_name);
        let site = &self.frontend_url;

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width">
    <title>{title}</title>
</head>
<body style="margin: 0; padding: 0; background-color: #f3f4f6;">
    <table align="center" role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="max-width: 600px; margin: auto;">
        <tr>
            <td style="background-color: #667eea; padding: 40px 30px; text-align: center;">
                <h1 style="margin: 0; font-family: sans-serif; font-size: 28px; color: #ffffff;">Magicians News</h1>
            </td>
        </tr>
        <tr>
            <td style="background-color: #ffffff; padding: 40px 30px; font-family: sans-serif; font-size: 16px; line-height: 24px; color: #4b5563;">
                <h2 style="margin: 0 0 20px; font-size: 18px; color: #1f2937;">Hi {name},</h2>
                <p style="margin: 0 0 30px;">{intro}</p>
                <p style="margin: 0 0 30px; text-align: center;">
                    <a href="{action_link}" style="background-color: #667eea; color: #ffffff; padding: 14px 32px; border-radius: 6px; font-weight: 600; text-decoration: none;">{action_label}</a>
                </p>
                <p style="margin: 0 0 10px; font-size: 14px; color: #6b7280;">Or copy and paste this link into your browser:</p>
                <p style="margin: 0 0 30px; font-size: 14px; word-break: break-all;"><a href="{action_link}" style="color: #667eea;">{action_link}</a></p>
                <p style="margin: 0; font-size: 14px; color: #6b7280;">{footer}</p>
            </td>
        </tr>
        <tr>
            <td style="background-color: #f9fafb; padding: 30px; text-align: center; font-family: sans-serif; font-size: 14px; color: #6b7280;">
                Magicians News - Your Daily Dose of Magic<br>
                <a href="{site}" style="color: #667eea;">magicians.news</a>
            </td>
        </tr>
    </table>
</body>
</html>"#
        )
    }

    fn create_newsletter_body(&self, to_name: Option<&str>, unsubscribe_link: &str) -> String {
        let greeting = match to_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => format!("Hi {},", escape_html(name)),
            None => "Hi there,".to_string(),
        };
        let site = &self.frontend_url;

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width">
    <title>Welcome to Magicians News</title>
</head>
<body style="margin: 0; padding: 0; background-color: #f3f4f6;">
    <table align="center" role="presentation" cellspacing="0" cellpadding="0" border="0" width="100%" style="max-width: 600px; margin: auto;">
        <tr>
            <td style="background-color: #667eea; padding: 40px 30px; text-align: center;">
                <h1 style="margin: 0; font-family: sans-serif; font-size: 28px; color: #ffffff;">Magicians News</h1>
            </td>
        </tr>
        <tr>
            <td style="background-color: #ffffff; padding: 40px 30px 20px; font-family: sans-serif; font-size: 16px; line-height: 24px; color: #4b5563;">
                <h2 style="margin: 0 0 20px; font-size: 18px; color: #1f2937;">{greeting}</h2>
                <p style="margin: 0 0 15px;">Thank you for subscribing to our newsletter! You'll be among the first to know when we launch.</p>
                <p style="margin: 0; font-size: 14px; color: #6b7280;">We'll send you updates about our launch, early access opportunities, and exclusive content for founding members.</p>
            </td>
        </tr>
        <tr>
            <td style="background-color: #ffffff; padding: 20px 30px 40px; font-family: sans-serif; font-size: 14px; line-height: 22px; color: #4b5563; border-top: 1px solid #e5e7eb;">
                <p style="margin: 0 0 10px; font-size: 16px; color: #1f2937; font-weight: 600;">What to expect:</p>
                <p style="margin: 0;">&bull; Launch announcement with early access pricing (&euro;1/month)<br>&bull; Exclusive content previews<br>&bull; Founding member benefits</p>
            </td>
        </tr>
        <tr>
            <td style="background-color: #f9fafb; padding: 30px; text-align: center; font-family: sans-serif; font-size: 14px; color: #6b7280;">
                Magicians News - Your Daily Dose of Magic<br>
                <a href="{site}" style="color: #667eea;">magicians.news</a>
                <p style="margin: 10px 0 0; font-size: 12px; color: #9ca3af;">Don't want to receive these emails? <a href="{unsubscribe_link}" style="color: #667eea; text-decoration: underline;">Unsubscribe</a></p>
            </td>
        </tr>
    </table>
</body>
</html>"#
        )
    }
}
