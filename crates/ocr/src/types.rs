use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Device fields found on a label. Absent fields are omitted when serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl DeviceInfo {
    pub fn is_empty(&self) -> bool {
        self.imei.is_none() && self.model.is_none() && self.storage.is_none() && self.color.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Carrier {
    Ups,
    Usps,
    Fedex,
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Carrier::Ups => write!(f, "UPS"),
            Carrier::Usps => write!(f, "USPS"),
            Carrier::Fedex => write!(f, "FEDEX"),
        }
    }
}

/// Shipping fields found on a label. `carrier` is only ever set together with
/// `tracking_number`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<Carrier>,
}

impl ShippingInfo {
    pub fn is_empty(&self) -> bool {
        self.tracking_number.is_none()
    }
}

/// Everything a successful scan produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    pub device: DeviceInfo,
    pub shipping: ShippingInfo,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing or undecodable image.
    Input,
    /// The OCR engine itself failed.
    Recognition,
    Unexpected,
}

impl FailureKind {
    pub fn is_client_error(self) -> bool {
        matches!(self, FailureKind::Input)
    }
}

/// Outcome of a scan as returned to clients.
///
/// Serializes as `{success: true, device, shipping, raw_text}` or
/// `{success: false, error}`; the failure kind stays internal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Success(ScanReport),
    Failure { kind: FailureKind, error: String },
}

impl ScanResult {
    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        ScanResult::Failure { kind, error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanResult::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ScanResult::Success(_) => None,
            ScanResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl Serialize for ScanResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScanResult::Success(report) => {
                let mut s = serializer.serialize_struct("ScanResult", 4)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("device", &report.device)?;
                s.serialize_field("shipping", &report.shipping)?;
                s.serialize_field("raw_text", &report.raw_text)?;
                s.end()
            }
            ScanResult::Failure { error, .. } => {
                let mut s = serializer.serialize_struct("ScanResult", 2)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn carrier_display_matches_wire_name() {
        assert_eq!(Carrier::Ups.to_string(), "UPS");
        assert_eq!(Carrier::Fedex.to_string(), "FEDEX");
        assert_eq!(serde_json::to_value(Carrier::Usps).unwrap(), json!("USPS"));
    }

    #[test]
    fn empty_report_serializes_empty_mappings() {
        let v = serde_json::to_value(ScanResult::Success(ScanReport::default())).unwrap();
        assert_eq!(
            v,
            json!({ "success": true, "device": {}, "shipping": {}, "raw_text": "" })
        );
    }

    #[test]
    fn partial_fields_are_sparse() {
        let report = ScanReport {
            device: DeviceInfo { storage: Some("128GB".into()), ..Default::default() },
            shipping: ShippingInfo {
                tracking_number: Some("1Z999AA10123456784".into()),
                carrier: Some(Carrier::Ups),
            },
            raw_text: "x".into(),
        };
        let v = serde_json::to_value(ScanResult::Success(report)).unwrap();
        assert_eq!(v["device"], json!({ "storage": "128GB" }));
        assert_eq!(v["shipping"]["carrier"], json!("UPS"));
    }

    #[test]
    fn failure_has_only_success_and_error() {
        let v = serde_json::to_value(ScanResult::failure(FailureKind::Input, "No image provided"))
            .unwrap();
        assert_eq!(v, json!({ "success": false, "error": "No image provided" }));
    }

    #[test]
    fn only_input_failures_are_client_errors() {
        assert!(FailureKind::Input.is_client_error());
        assert!(!FailureKind::Recognition.is_client_error());
        assert!(!FailureKind::Unexpected.is_client_error());
    }
}
