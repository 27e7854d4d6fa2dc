//! Payment envelope: purchase intent round-tripped through the provider.
//!
//! The envelope travels as the preference's external reference and comes
//! back on every payment notification. It is untrusted input: decoding
//! only checks shape, and the ledger re-validates it against current tier
//! state before committing anything.

use crate::error::{LedgerError, Result};
use crate::types::{EventId, PaymentMode, ProductId, PurchaseKind, TierId, UserId};
use serde::{Deserialize, Serialize};

/// Wire form: `{ kind, buyerId, eventId, tierId, quantity, paymentMode }`.
///
/// Product envelopes carry `productId` instead of `tierId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEnvelope {
    /// Ticket or product
    pub kind: PurchaseKind,
    /// Buyer (becomes the ticket holder)
    pub buyer_id: UserId,
    /// Event
    pub event_id: EventId,
    /// Tier, for ticket envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_id: Option<TierId>,
    /// Product, for product envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Requested quantity (kept signed so bad input survives decoding and
    /// is rejected by quantity validation with a precise error)
    pub quantity: i64,
    /// Full or deposit
    #[serde(default = "default_mode")]
    pub payment_mode: PaymentMode,
}

const fn default_mode() -> PaymentMode {
    PaymentMode::Full
}

impl PaymentEnvelope {
    /// Envelope for a ticket purchase.
    #[must_use]
    pub const fn ticket(
        buyer_id: UserId,
        event_id: EventId,
        tier_id: TierId,
        quantity: i64,
        payment_mode: PaymentMode,
    ) -> Self {
        Self {
            kind: PurchaseKind::Ticket,
            buyer_id,
            event_id,
            tier_id: Some(tier_id),
            product_id: None,
            quantity,
            payment_mode,
        }
    }

    /// Envelope for an ancillary product purchase.
    #[must_use]
    pub const fn product(
        buyer_id: UserId,
        event_id: EventId,
        product_id: ProductId,
        quantity: i64,
    ) -> Self {
        Self {
            kind: PurchaseKind::Product,
            buyer_id,
            event_id,
            tier_id: None,
            product_id: Some(product_id),
            quantity,
            payment_mode: PaymentMode::Full,
        }
    }

    /// Serialize to the opaque string handed to the provider.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidEnvelope` if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LedgerError::InvalidEnvelope(e.to_string()))
    }

    /// Parse an envelope echoed back by the provider.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidEnvelope` on malformed JSON or when the
    /// identifier required by `kind` is missing.
    pub fn decode(raw: &str) -> Result<Self> {
        let envelope: Self =
            serde_json::from_str(raw).map_err(|e| LedgerError::InvalidEnvelope(e.to_string()))?;
        match envelope.kind {
            PurchaseKind::Ticket if envelope.tier_id.is_none() => Err(
                LedgerError::InvalidEnvelope("ticket envelope without tierId".to_string()),
            ),
            PurchaseKind::Product if envelope.product_id.is_none() => Err(
                LedgerError::InvalidEnvelope("product envelope without productId".to_string()),
            ),
            _ => Ok(envelope),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_camel_case() {
        let envelope = PaymentEnvelope::ticket(
            UserId::new(),
            EventId::new(),
            TierId::new(),
            2,
            PaymentMode::Partial,
        );
        let json: serde_json::Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(json["kind"], "TICKET");
        assert_eq!(json["paymentMode"], "PARTIAL");
        assert_eq!(json["quantity"], 2);
        assert!(json.get("buyerId").is_some());
        assert!(json.get("tierId").is_some());
        assert!(json.get("productId").is_none());
    }

    #[test]
    fn test_decode_replays_identically() {
        let envelope =
            PaymentEnvelope::product(UserId::new(), EventId::new(), ProductId::new(), 3);
        let raw = envelope.encode().unwrap();
        assert_eq!(PaymentEnvelope::decode(&raw).unwrap(), envelope);
        assert_eq!(PaymentEnvelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_decode_rejects_garbage_and_missing_ids() {
        assert!(matches!(
            PaymentEnvelope::decode("not json"),
            Err(LedgerError::InvalidEnvelope(_))
        ));

        let raw = format!(
            r#"{{"kind":"TICKET","buyerId":"{}","eventId":"{}","quantity":1}}"#,
            UserId::new(),
            EventId::new()
        );
        assert!(matches!(
            PaymentEnvelope::decode(&raw),
            Err(LedgerError::InvalidEnvelope(msg)) if msg.contains("tierId")
        ));
    }

    #[test]
    fn test_payment_mode_defaults_to_full() {
        let raw = format!(
            r#"{{"kind":"TICKET","buyerId":"{}","eventId":"{}","tierId":"{}","quantity":-1}}"#,
            UserId::new(),
            EventId::new(),
            TierId::new()
        );
        let envelope = PaymentEnvelope::decode(&raw).unwrap();
        assert_eq!(envelope.payment_mode, PaymentMode::Full);
        assert_eq!(envelope.quantity, -1);
    }
}
