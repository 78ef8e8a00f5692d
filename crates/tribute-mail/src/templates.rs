//! Email composition. Each function returns (subject, html body); the rows
//! land in the mail outbox for the external dispatcher to send.

pub const SITE_NAME: &str = "Tribute Wall";

fn shell(heading: &str, body: &str) -> String {
    format!(
        "<div style=\"font-family: Georgia, serif; max-width: 600px; margin: 0 auto; \
         padding: 32px; border: 1px solid #ddd; border-radius: 8px;\">\
         <h1 style=\"font-size: 22px; margin-top: 0;\">{SITE_NAME}</h1>\
         <h2 style=\"font-size: 16px; color: #555;\">{heading}</h2>\
         {body}\
         <p style=\"margin-top: 32px; font-size: 12px; color: #888;\">Sent via {SITE_NAME}</p>\
         </div>"
    )
}

pub fn welcome(display_name: &str) -> (String, String) {
    let subject = format!("Your account is verified — welcome to {SITE_NAME}");
    let html = shell(
        "Account verified",
        &format!(
            "<p>Dear {display_name},</p>\
             <p>Your account has been verified by an admin. You can now create memorial \
             posts for your loved ones, send private condolences to other families, and \
             browse the family house archives.</p>\
             <p>Thank you for helping us preserve our community's history.</p>"
        ),
    );
    (subject, html)
}

pub fn new_message(
    recipient_name: &str,
    sender_name: &str,
    text: &str,
    chat_url: &str,
) -> (String, String) {
    let subject = format!("New message from {sender_name} — {SITE_NAME}");
    let quoted = if text.is_empty() {
        String::new()
    } else {
        format!(
            "<blockquote style=\"color: #555; font-style: italic;\">{}</blockquote>",
            escape_html(text)
        )
    };
    let html = shell(
        "New message",
        &format!(
            "<p>Dear {recipient_name},</p>\
             <p>You have received a new private message from <strong>{sender_name}</strong> \
             regarding a memorial.</p>\
             {quoted}\
             <p><a href=\"{chat_url}\">Reply to message</a></p>"
        ),
    );
    (subject, html)
}

pub fn submission_received(display_name: &str, full_name: &str) -> (String, String) {
    let subject = format!("Submission received: {full_name} — {SITE_NAME}");
    let html = shell(
        "Submission received",
        &format!(
            "<p>Dear {display_name},</p>\
             <p>We have received your memorial submission for <strong>{full_name}</strong>.</p>\
             <p>It is currently pending approval. Our team will review it shortly to ensure \
             it meets our community guidelines. You will receive another email once it is \
             approved and live on the Tribute Wall.</p>"
        ),
    );
    (subject, html)
}

pub fn memorial_live(display_name: &str, full_name: &str, memorial_url: &str) -> (String, String) {
    let subject = format!("Live now: {full_name} — {SITE_NAME}");
    let html = shell(
        "Memorial approved",
        &format!(
            "<p>Dear {display_name},</p>\
             <p>The memorial for <strong>{full_name}</strong> has been approved and is now \
             live on the Tribute Wall.</p>\
             <p><a href=\"{memorial_url}\">View memorial</a></p>\
             <p>Friends and family can now visit and leave messages.</p>"
        ),
    );
    (subject, html)
}

pub fn password_reset(display_name: &str, reset_url: &str) -> (String, String) {
    let subject = format!("Reset your password — {SITE_NAME}");
    let html = shell(
        "Password reset",
        &format!(
            "<p>Dear {display_name},</p>\
             <p>We received a request to reset your password. Follow the link below to \
             choose a new one; it is valid for one hour.</p>\
             <p><a href=\"{reset_url}\">Reset password</a></p>\
             <p>If you did not request this, you can ignore this email.</p>"
        ),
    );
    (subject, html)
}

/// Message text is user content; everything else interpolated into the
/// templates comes from our own records.
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_is_escaped() {
        let (_, html) = new_message("A", "B", "<script>alert(1)</script>", "https://x/chat/1");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn subjects_name_the_memorial() {
        let (subject, _) = submission_received("A", "Ibrahim K.");
        assert!(subject.contains("Ibrahim K."));
        let (subject, _) = memorial_live("A", "Ibrahim K.", "https://x/memorial/1");
        assert!(subject.starts_with("Live now:"));
    }
}
