//! Per-connection handler: read the upgrade query, pick or create a
//! session, and hand the connection to it.
//!
//! The flow is:
//!   1. Parse `sid`, `nonce`, `v`, and `format` from the query string
//!   2. Resolve the session (resume when both `sid` and `nonce` are given)
//!   3. Attach: the session greets the client and replays what it missed
//!
//! After attaching, the session owns the connection; this task is done.

use eventgate_protocol::{Encoding, ProtocolError, ProtocolVersion, WireFormat};
use eventgate_session::{Hub, SessionError, SessionId};
use eventgate_snowflake::Snowflake;
use eventgate_transport::{CloseReason, Connection, Handshake, WebSocketConnection};

use crate::EventgateError;

/// What a client asked for in its upgrade query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ConnectParams {
    /// Session to resume and the last nonce the client saw.
    pub(crate) resume: Option<(SessionId, i64)>,
    pub(crate) encoding: Encoding,
}

/// Parses the upgrade query.
///
/// Unknown keys are ignored. A `sid` without a `nonce` (or the reverse)
/// starts a fresh session.
pub(crate) fn parse_query(query: Option<&str>) -> Result<ConnectParams, ProtocolError> {
    let mut sid = None;
    let mut nonce = None;
    let mut version = ProtocolVersion::default();
    let mut format = WireFormat::default();

    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "sid" => sid = Some(parse_number(key, value)?),
            "nonce" => nonce = Some(parse_number(key, value)?),
            "v" => version = value.parse()?,
            "format" => format = value.parse()?,
            _ => {}
        }
    }

    let resume = match (sid, nonce) {
        (Some(sid), Some(nonce)) => Some((Snowflake(sid), nonce)),
        _ => None,
    };
    Ok(ConnectParams {
        resume,
        encoding: Encoding::negotiate(version, format)?,
    })
}

fn parse_number(key: &str, value: &str) -> Result<i64, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidMessage(format!("{key} must be an integer, got {value:?}")))
}

/// Handles a single connection from upgrade to attach.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    handshake: Handshake,
    hub: Hub<WebSocketConnection>,
) -> Result<(), EventgateError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, query = ?handshake.query, "handling new connection");

    let params = match parse_query(handshake.query.as_deref()) {
        Ok(params) => params,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "rejecting connection");
            conn.close(CloseReason::BadRequest).await?;
            return Err(e.into());
        }
    };

    let session = match hub.connect(params.resume.map(|(sid, _)| sid)).await {
        Ok(session) => session,
        Err(e @ SessionError::NotFound(_)) => {
            tracing::debug!(%conn_id, error = %e, "resume failed");
            conn.close(CloseReason::SessionNotFound).await?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    session
        .attach(conn, params.encoding, params.resume.map(|(_, nonce)| nonce))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_none_is_fresh_legacy_json() {
        let params = parse_query(None).unwrap();
        assert_eq!(params.resume, None);
        assert_eq!(params.encoding, Encoding::LegacyJson);
    }

    #[test]
    fn test_parse_query_resume_needs_both_sid_and_nonce() {
        let params = parse_query(Some("sid=123&nonce=4")).unwrap();
        assert_eq!(params.resume, Some((Snowflake(123), 4)));

        assert_eq!(parse_query(Some("sid=123")).unwrap().resume, None);
        assert_eq!(parse_query(Some("nonce=4")).unwrap().resume, None);
    }

    #[test]
    fn test_parse_query_selects_encoding() {
        let msgpack = parse_query(Some("v=0&format=msgpack")).unwrap();
        assert_eq!(msgpack.encoding, Encoding::LegacyMsgpack);
        let current = parse_query(Some("v=1")).unwrap();
        assert_eq!(current.encoding, Encoding::CurrentJson);
    }

    #[test]
    fn test_parse_query_ignores_unknown_keys_and_empty_pairs() {
        let params = parse_query(Some("&token=abc&&v=1&")).unwrap();
        assert_eq!(params.encoding, Encoding::CurrentJson);
    }

    #[test]
    fn test_parse_query_current_msgpack_rejected() {
        assert!(matches!(
            parse_query(Some("v=1&format=msgpack")),
            Err(ProtocolError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_parse_query_malformed_values_rejected() {
        assert!(parse_query(Some("sid=abc&nonce=1")).is_err());
        assert!(parse_query(Some("sid=1&nonce=")).is_err());
        assert!(parse_query(Some("v=7")).is_err());
        assert!(parse_query(Some("format=xml")).is_err());
    }
}
