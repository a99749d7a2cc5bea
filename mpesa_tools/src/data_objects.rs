use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------     OAuth token      --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds, as a string, because that is what Daraja sends.
    pub expires_in: String,
}

impl TokenResponse {
    pub fn expires_in_secs(&self) -> i64 {
        self.expires_in.parse().unwrap_or(3600)
    }
}

//--------------------------------------      STK push        --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: String,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    /// The correlation id. The asynchronous result echoes this value, and it is what the reconciler matches on.
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
    pub customer_message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub response_code: String,
    pub result_code: String,
    pub result_desc: String,
}

//--------------------------------------      B2C payout      --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct B2cRequest {
    pub initiator_name: String,
    pub security_credential: String,
    #[serde(rename = "CommandID")]
    pub command_id: String,
    pub amount: String,
    pub party_a: String,
    pub party_b: String,
    pub remarks: String,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: String,
    #[serde(rename = "ResultURL")]
    pub result_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct B2cResponse {
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    pub response_code: String,
    pub response_description: String,
}

//--------------------------------------   STK result webhook  -------------------------------------------------------
/// The envelope Daraja POSTs to the callback URL: `{"Body": {"stkCallback": {...}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    pub fn amount(&self) -> Option<f64> {
        self.metadata_value("Amount").and_then(|v| v.as_f64())
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.metadata_value("MpesaReceiptNumber").and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    pub fn phone_number(&self) -> Option<String> {
        // Daraja sends the MSISDN as a number
        self.metadata_value("PhoneNumber").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn metadata_value(&self, name: &str) -> Option<&Value> {
        self.callback_metadata.as_ref()?.item.iter().find(|i| i.name == name).map(|i| &i.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackItem {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[cfg(test)]
mod test {
    use super::*;

    const SUCCESS_PAYLOAD: &str = r#"{
      "Body": {
        "stkCallback": {
          "MerchantRequestID": "29115-34620561-1",
          "CheckoutRequestID": "ws_CO_191220191020363925",
          "ResultCode": 0,
          "ResultDesc": "The service request is processed successfully.",
          "CallbackMetadata": {
            "Item": [
              { "Name": "Amount", "Value": 1100.00 },
              { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
              { "Name": "TransactionDate", "Value": 20191219102115 },
              { "Name": "PhoneNumber", "Value": 254708374149 }
            ]
          }
        }
      }
    }"#;

    const FAILURE_PAYLOAD: &str = r#"{
      "Body": {
        "stkCallback": {
          "MerchantRequestID": "29115-34620561-1",
          "CheckoutRequestID": "ws_CO_191220191020363925",
          "ResultCode": 1032,
          "ResultDesc": "Request cancelled by user."
        }
      }
    }"#;

    #[test]
    fn parses_a_successful_callback() {
        let envelope: StkCallbackEnvelope = serde_json::from_str(SUCCESS_PAYLOAD).unwrap();
        let cb = envelope.body.stk_callback;
        assert!(cb.is_success());
        assert_eq!(cb.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(cb.amount(), Some(1100.0));
        assert_eq!(cb.receipt_number().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(cb.phone_number().as_deref(), Some("254708374149"));
    }

    #[test]
    fn parses_a_failed_callback_without_metadata() {
        let envelope: StkCallbackEnvelope = serde_json::from_str(FAILURE_PAYLOAD).unwrap();
        let cb = envelope.body.stk_callback;
        assert!(!cb.is_success());
        assert_eq!(cb.result_code, 1032);
        assert!(cb.amount().is_none());
        assert!(cb.receipt_number().is_none());
    }
}
