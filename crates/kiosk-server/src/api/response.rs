//! JSON bodies.
//!
//! Field names are camelCase. Optional fields are omitted rather than sent
//! as `null`, except the operation id of a conflict.

use std::time::Duration;

use kiosk_core::{IdentifierKind, Identification};
use kiosk_terminal::{Resolution, StagedCard};
use serde::{Deserialize, Serialize};

/// Successful stage: the card is parked and waiting for `/confirm`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSuccess {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader: Option<String>,
    pub operation_id: String,
    pub timeout_sec: u64,
    pub elapsed_milliseconds: u64,
    pub attempts: u32,
}

impl From<&StagedCard> for IssueSuccess {
    fn from(card: &StagedCard) -> Self {
        let id = &card.identification;
        let (uid, uid_hex) = split_identifier(id);
        Self {
            success: true,
            uid,
            uid_hex,
            facility: id.facility,
            card: id.card_number,
            reader: id.reader.clone(),
            operation_id: card.operation_id.to_string(),
            timeout_sec: card.timeout.as_secs(),
            elapsed_milliseconds: millis(card.elapsed),
            attempts: card.attempts,
        }
    }
}

/// A stage that ran but identified nothing, or failed on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFailure {
    pub success: bool,
    pub error: String,
    pub elapsed_milliseconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl IssueFailure {
    pub fn new(error: impl Into<String>, elapsed: Duration, attempts: Option<u32>) -> Self {
        Self {
            success: false,
            error: error.into(),
            elapsed_milliseconds: millis(elapsed),
            attempts,
        }
    }
}

/// Another operation holds the dispenser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub error: String,
    /// `null` while the other stage has not parked its card yet.
    pub operation_id: Option<String>,
}

/// Body of `POST /confirm`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub operation_id: String,
    pub allow: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSuccess {
    pub success: bool,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl From<&Resolution> for ConfirmSuccess {
    fn from(resolution: &Resolution) -> Self {
        Self {
            success: true,
            action: resolution.action(),
            uid: Some(resolution.identification().identifier.clone()),
        }
    }
}

/// Generic `{error}` body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of `/card-status`. `-1` stands for a failed query.
#[derive(Debug, Clone, Serialize)]
pub struct StatusBody {
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn split_identifier(id: &Identification) -> (Option<String>, Option<String>) {
    match id.kind {
        IdentifierKind::Token => (Some(id.identifier.clone()), None),
        IdentifierKind::HexUid => (None, Some(id.identifier.clone())),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::OperationId;
    use serde_json::json;

    fn staged(identification: Identification) -> StagedCard {
        StagedCard {
            operation_id: OperationId::new(),
            identification,
            timeout: Duration::from_secs(30),
            elapsed: Duration::from_millis(1234),
            attempts: 1,
        }
    }

    #[test]
    fn test_token_goes_to_uid() {
        let card = staged(Identification::token("045678"));
        let value = serde_json::to_value(IssueSuccess::from(&card)).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["uid"], json!("045678"));
        assert_eq!(value["timeoutSec"], json!(30));
        assert_eq!(value["elapsedMilliseconds"], json!(1234));
        assert_eq!(value["operationId"], json!(card.operation_id.to_string()));
        assert!(value.get("uidHex").is_none());
        assert!(value.get("facility").is_none());
    }

    #[test]
    fn test_hex_uid_carries_wiegand_and_reader() {
        let card = staged(
            Identification::hex_uid("AB123456")
                .with_wiegand(86, 9320)
                .with_reader("ACS ACR122U"),
        );
        let value = serde_json::to_value(IssueSuccess::from(&card)).unwrap();

        assert_eq!(value["uidHex"], json!("AB123456"));
        assert_eq!(value["facility"], json!(86));
        assert_eq!(value["card"], json!(9320));
        assert_eq!(value["reader"], json!("ACS ACR122U"));
        assert!(value.get("uid").is_none());
    }

    #[test]
    fn test_confirm_request_is_camel_case() {
        let request: ConfirmRequest =
            serde_json::from_str(r#"{"operationId":"abc","allow":true}"#).unwrap();
        assert_eq!(request.operation_id, "abc");
        assert!(request.allow);

        assert!(serde_json::from_str::<ConfirmRequest>(r#"{"operation_id":"abc","allow":true}"#).is_err());
    }

    #[test]
    fn test_conflict_always_carries_operation_id() {
        let staging = serde_json::to_value(Conflict {
            error: "Operation already pending".to_string(),
            operation_id: None,
        })
        .unwrap();
        assert_eq!(
            staging,
            json!({ "error": "Operation already pending", "operationId": null })
        );

        let parked = serde_json::to_value(Conflict {
            error: "Operation already pending".to_string(),
            operation_id: Some("abc".to_string()),
        })
        .unwrap();
        assert_eq!(parked["operationId"], json!("abc"));
    }

    #[test]
    fn test_status_body_omits_error_on_success() {
        let value = serde_json::to_value(StatusBody {
            status: 2,
            error: None,
        })
        .unwrap();
        assert_eq!(value, json!({ "status": 2 }));
    }
}
