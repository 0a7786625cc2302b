use crate::types::{ErrorCategory, TransportFailure};

/// Maps a terminal failure down to the closed `ErrorCategory` set (§4.2).
/// Precedence, highest first: redirect loop, then HTTP status, then
/// transport failure, then unknown. A redirect loop can only be detected by
/// the checker itself, so it always wins over whatever status code (if any)
/// accompanied it.
pub fn classify_error(
    transport: Option<TransportFailure>,
    status: u16,
    redirect_loop: bool,
) -> ErrorCategory {
    if redirect_loop {
        return ErrorCategory::RedirectLoop;
    }

    if status == 401 || status == 403 {
        return ErrorCategory::AuthRequired;
    }
    if (400..500).contains(&status) {
        return ErrorCategory::ClientError;
    }
    if (500..600).contains(&status) {
        return ErrorCategory::ServerError;
    }

    match transport {
        Some(TransportFailure::Timeout) => ErrorCategory::Timeout,
        Some(TransportFailure::DnsFailure) => ErrorCategory::DnsFailure,
        Some(TransportFailure::ConnectionRefused) => ErrorCategory::ConnectionRefused,
        _ => ErrorCategory::Unknown,
    }
}
