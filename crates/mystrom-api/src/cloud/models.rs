// Cloud API response models
//
// The device list is kept mostly untyped: the full record is flattened
// into the state tree as-is, so only the fields the engine routes on are
// lifted out.

use serde_json::{Map, Value};

/// One entry of `GET /devices`.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudDevice {
    /// Vendor-assigned id (the device MAC on current firmware).
    pub id: String,
    pub name: Option<String>,
    /// Hardware tag as reported by the cloud (`wse`, `wbp`, ...).
    pub device_type: String,
    /// The complete record, including `id`, `name` and `type`.
    pub record: Map<String, Value>,
}

impl CloudDevice {
    /// Build from a raw device record. Returns `None` if the record has no
    /// usable `id`.
    pub fn from_record(record: Map<String, Value>) -> Option<Self> {
        let id = match record.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let device_type = record
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        Some(Self {
            id,
            name,
            device_type,
            record,
        })
    }
}

/// Keys under which the wifi info reports the device's IPv4 address,
/// in lookup order.
pub const IPV4_KEYS: &[&str] = &["ipv4", "ip", "ipAddress"];

/// The `info` object of a `GET /device/wifiInfo` response, or the whole
/// response when it is not wrapped.
pub fn wifi_info_body(response: &Value) -> &Value {
    match response.get("info") {
        Some(info @ Value::Object(_)) => info,
        _ => response,
    }
}

/// Extract the device's LAN address from a wifi info response.
pub fn wifi_ipv4(response: &Value) -> Option<String> {
    let info = wifi_info_body(response);
    IPV4_KEYS
        .iter()
        .find_map(|key| info.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
}
