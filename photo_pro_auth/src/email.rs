//! Outgoing email messages

use serde::{Deserialize, Serialize};

pub const PRODUCT_NAME: &str = "Equipment Photo Pro";

/// A rendered email, ready for any transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Login code email
pub fn verification_email(to: &str, code: &str, ttl_minutes: i64) -> EmailMessage {
    let text = format!(
        "{PRODUCT_NAME} - Your Login Code\n\n\
         Use the following code to sign in: {code}\n\n\
         This code will expire in {ttl_minutes} minutes.\n\n\
         If you didn't request this code, please ignore this email.\n"
    );

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: #667eea; padding: 30px; text-align: center;">
    <h1 style="color: white; margin: 0;">{PRODUCT_NAME}</h1>
    <p style="color: white; margin: 10px 0 0 0;">Professional Equipment Photo Enhancement</p>
  </div>
  <div style="padding: 30px; background: #f9f9f9;">
    <h2 style="color: #333;">Your Login Code</h2>
    <p style="color: #666;">Use the following code to sign in to your {PRODUCT_NAME} account:</p>
    <div style="background: white; border: 2px solid #667eea; border-radius: 8px; padding: 20px; text-align: center;">
      <span style="font-size: 32px; font-weight: bold; color: #667eea; letter-spacing: 8px;">{code}</span>
    </div>
    <p style="color: #666;">This code will expire in {ttl_minutes} minutes for security reasons.</p>
    <p style="color: #999; font-size: 14px;">If you didn't request this code, please ignore this email.</p>
  </div>
</div>"#
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Your {PRODUCT_NAME} Login Code"),
        text,
        html,
    }
}

/// Sent once, when an account is first created
pub fn welcome_email(to: &str) -> EmailMessage {
    let features = [
        "Upload and enhance equipment photos",
        "Choose from various backgrounds and lighting",
        "Download professional-quality results",
        "Track your processing history",
    ];

    let text = format!(
        "Welcome to {PRODUCT_NAME}!\n\n\
         Thank you for joining. You can now enhance your equipment photos with our AI-powered technology.\n\n{}\n\n\
         If you have any questions, feel free to contact our support team.\n",
        features
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #667eea;">Welcome to {PRODUCT_NAME}!</h1>
  <p>Thank you for joining {PRODUCT_NAME}! You can now enhance your equipment photos with our AI-powered technology.</p>
  <ul>{}</ul>
  <p style="color: #999;">If you have any questions, feel free to contact our support team.</p>
</div>"#,
        features
            .iter()
            .map(|f| format!("<li>{f}</li>"))
            .collect::<String>()
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Welcome to {PRODUCT_NAME}!"),
        text,
        html,
    }
}

/// Fixed message for checking a transport end to end
pub fn test_email(to: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Test Email from {PRODUCT_NAME}"),
        text: "This is a test email to verify email functionality".into(),
        html: "<p>This is a test email to verify email functionality</p>".into(),
    }
}
