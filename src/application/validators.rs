use url::Url;
use validator::ValidateEmail;

/// Validates that the input looks like a valid email address
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.validate_email()
}

/// Validates an ISO 4217 style currency code (three uppercase ASCII letters)
pub fn is_valid_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Validates a payment reference before it is sent to a gateway.
/// Rules:
/// - 1-64 characters
/// - Only ASCII letters, numbers, hyphens, underscores, dots
pub fn is_valid_payment_reference(reference: &str) -> bool {
    if reference.is_empty() || reference.len() > 64 {
        return false;
    }

    reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Callback and return URLs handed to gateways must be absolute http(s) URLs
pub fn is_valid_callback_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("user+tag@example.org"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("   "));
        assert!(!is_valid_email("notanemail"));
    }

    #[test]
    fn test_currency_codes() {
        assert!(is_valid_currency_code("ZAR"));
        assert!(is_valid_currency_code("NGN"));
        assert!(!is_valid_currency_code("zar"));
        assert!(!is_valid_currency_code("RAND"));
        assert!(!is_valid_currency_code(""));
    }

    #[test]
    fn test_payment_references() {
        assert!(is_valid_payment_reference("INV-202601-00001"));
        assert!(is_valid_payment_reference("inv_1.retry"));
        assert!(!is_valid_payment_reference(""));
        assert!(!is_valid_payment_reference("has space"));
        assert!(!is_valid_payment_reference(&"a".repeat(65)));
    }

    #[test]
    fn test_callback_urls() {
        assert!(is_valid_callback_url("https://billing.example.com/return"));
        assert!(is_valid_callback_url("http://localhost:3000/cb"));
        assert!(!is_valid_callback_url("ftp://example.com"));
        assert!(!is_valid_callback_url("/relative"));
    }
}
