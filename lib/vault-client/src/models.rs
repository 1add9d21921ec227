use crate::auth::TokenInfo;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// A secret as read from a KV engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultSecret {
    pub data: Map<String, Value>,
    /// Zero when the engine hands out no lease (KV).
    pub lease_duration: Duration,
    pub renewable: bool,
}

/// Mount description returned by `sys/internal/ui/mounts/<path>`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MountInfo {
    pub path: String,
    #[serde(default)]
    pub options: Option<HashMap<String, String>>,
}

impl MountInfo {
    pub fn is_kv_v2(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.get("version"))
            .is_some_and(|v| v == "2")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSecret {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

impl RawSecret {
    pub fn into_kv1(self) -> Option<VaultSecret> {
        let data = match self.data? {
            Value::Object(map) => map,
            _ => return None,
        };
        Some(VaultSecret {
            data,
            lease_duration: Duration::from_secs(self.lease_duration),
            renewable: self.renewable,
        })
    }

    /// KV v2 nests the payload under `data.data`; a deleted version reports `null` there.
    pub fn into_kv2(self) -> Option<VaultSecret> {
        let data = match self.data? {
            Value::Object(mut outer) => match outer.remove("data")? {
                Value::Object(inner) => inner,
                _ => return None,
            },
            _ => return None,
        };
        Some(VaultSecret {
            data,
            lease_duration: Duration::from_secs(self.lease_duration),
            renewable: self.renewable,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthData {
    pub client_token: String,
    #[serde(default)]
    pub accessor: Option<String>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

impl AuthData {
    pub fn into_token_info(self) -> TokenInfo {
        TokenInfo {
            token: self.client_token,
            accessor: self.accessor,
            lease_duration: Duration::from_secs(self.lease_duration),
            renewable: self.renewable,
        }
    }
}

/// Body of `auth/<backend>/login` and `auth/token/renew-self`.
#[derive(Debug, Deserialize)]
pub(crate) struct RenewResponse {
    pub auth: AuthData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_info_detects_kv_v2() {
        let json = r#"{"path":"concourse/","type":"kv","options":{"version":"2"}}"#;
        let mount: MountInfo = serde_json::from_str(json).unwrap();
        assert!(mount.is_kv_v2());

        let json = r#"{"path":"secret/","type":"kv","options":null}"#;
        let mount: MountInfo = serde_json::from_str(json).unwrap();
        assert!(!mount.is_kv_v2());
    }

    #[test]
    fn test_kv2_unwraps_nested_data() {
        let json = r#"{
            "data": {"data": {"value": "bar"}, "metadata": {"version": 1}},
            "lease_duration": 0
        }"#;
        let raw: RawSecret = serde_json::from_str(json).unwrap();
        let secret = raw.into_kv2().unwrap();
        assert_eq!(secret.data.get("value").unwrap(), "bar");
        assert_eq!(secret.lease_duration, Duration::ZERO);
    }

    #[test]
    fn test_kv2_deleted_version_is_absent() {
        let json = r#"{"data": {"data": null, "metadata": {"deletion_time": "2024-01-01T00:00:00Z"}}}"#;
        let raw: RawSecret = serde_json::from_str(json).unwrap();
        assert!(raw.into_kv2().is_none());
    }

    #[test]
    fn test_kv1_keeps_lease() {
        let json = r#"{"data": {"value": "bar"}, "lease_duration": 3600, "renewable": false}"#;
        let raw: RawSecret = serde_json::from_str(json).unwrap();
        let secret = raw.into_kv1().unwrap();
        assert_eq!(secret.lease_duration, Duration::from_secs(3600));
    }
}
