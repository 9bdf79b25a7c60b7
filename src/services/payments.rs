use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::order::{PaymentMethod, PaymentStatus};
use crate::errors::PaymentPreconditionError;

/// Fields a payment method requires at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MethodRequirements {
    pub transaction_ref: bool,
    pub evidence: bool,
}

/// Required fields per method. Wallet transfers are evidence-based and never
/// auto-approve; cash on delivery collects out-of-band.
pub fn requirements(method: PaymentMethod) -> MethodRequirements {
    match method {
        PaymentMethod::WalletTransfer => MethodRequirements {
            transaction_ref: true,
            evidence: true,
        },
        PaymentMethod::CashOnDelivery => MethodRequirements {
            transaction_ref: false,
            evidence: false,
        },
    }
}

/// Payment status a freshly submitted order starts in.
pub fn initial_payment_status(method: PaymentMethod) -> PaymentStatus {
    match method {
        PaymentMethod::WalletTransfer => PaymentStatus::PendingVerification,
        PaymentMethod::CashOnDelivery => PaymentStatus::Pending,
    }
}

fn present(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Checks the method-specific preconditions before anything is persisted.
/// A failing check blocks submission entirely; no order is created.
pub fn validate_submission(
    method: PaymentMethod,
    transaction_ref: Option<&str>,
    evidence_ref: Option<&str>,
) -> Result<(), PaymentPreconditionError> {
    let required = requirements(method);

    if required.transaction_ref && !present(transaction_ref) {
        return Err(PaymentPreconditionError::MissingTransactionRef);
    }
    if required.evidence && !present(evidence_ref) {
        return Err(PaymentPreconditionError::MissingEvidence);
    }

    Ok(())
}

/// Size/type contract for payment evidence. The upload itself belongs to the
/// external blob-storage collaborator; this core only vets the metadata
/// before accepting the opaque reference the collaborator returns.
#[derive(Debug, Clone)]
pub struct EvidencePolicy {
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

/// Metadata of an evidence file, as reported by the upload endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EvidenceUpload {
    pub content_type: String,
    pub size_bytes: u64,
}

pub fn validate_evidence_upload(
    policy: &EvidencePolicy,
    upload: &EvidenceUpload,
) -> Result<(), PaymentPreconditionError> {
    if upload.size_bytes > policy.max_bytes {
        return Err(PaymentPreconditionError::EvidenceTooLarge {
            max_bytes: policy.max_bytes,
        });
    }
    let content_type = upload.content_type.to_ascii_lowercase();
    if !policy
        .allowed_content_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
    {
        return Err(PaymentPreconditionError::UnsupportedEvidenceType(
            upload.content_type.clone(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn wallet_transfer_requires_both_fields() {
        let required = requirements(PaymentMethod::WalletTransfer);
        assert!(required.transaction_ref);
        assert!(required.evidence);
    }

    #[test]
    fn cash_on_delivery_requires_nothing() {
        let required = requirements(PaymentMethod::CashOnDelivery);
        assert!(!required.transaction_ref);
        assert!(!required.evidence);
        assert_eq!(
            initial_payment_status(PaymentMethod::CashOnDelivery),
            PaymentStatus::Pending
        );
        assert!(validate_submission(PaymentMethod::CashOnDelivery, None, None).is_ok());
    }

    #[test]
    fn wallet_transfer_starts_pending_verification() {
        assert_eq!(
            initial_payment_status(PaymentMethod::WalletTransfer),
            PaymentStatus::PendingVerification
        );
    }

    #[test]
    fn missing_transaction_ref_is_reported_first() {
        let result = validate_submission(PaymentMethod::WalletTransfer, None, Some("img1"));
        assert_matches!(result, Err(PaymentPreconditionError::MissingTransactionRef));
    }

    #[test]
    fn missing_evidence_blocks_submission() {
        let result = validate_submission(PaymentMethod::WalletTransfer, Some("TXN123"), None);
        assert_matches!(result, Err(PaymentPreconditionError::MissingEvidence));

        // Whitespace-only references do not count as present.
        let result = validate_submission(PaymentMethod::WalletTransfer, Some("TXN123"), Some("  "));
        assert_matches!(result, Err(PaymentPreconditionError::MissingEvidence));
    }

    #[test]
    fn evidence_contract_rejects_oversized_and_foreign_types() {
        let policy = EvidencePolicy::default();

        let too_big = EvidenceUpload {
            content_type: "image/png".into(),
            size_bytes: policy.max_bytes + 1,
        };
        assert_matches!(
            validate_evidence_upload(&policy, &too_big),
            Err(PaymentPreconditionError::EvidenceTooLarge { .. })
        );

        let pdf = EvidenceUpload {
            content_type: "application/pdf".into(),
            size_bytes: 1024,
        };
        assert_matches!(
            validate_evidence_upload(&policy, &pdf),
            Err(PaymentPreconditionError::UnsupportedEvidenceType(_))
        );

        let ok = EvidenceUpload {
            content_type: "IMAGE/JPEG".into(),
            size_bytes: 1024,
        };
        assert!(validate_evidence_upload(&policy, &ok).is_ok());
    }
}
