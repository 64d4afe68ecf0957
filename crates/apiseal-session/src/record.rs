use apiseal_core::{ApiSealError, ApiSealResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fields every stored session carries.
pub const MANDATORY_FIELDS: [&str; 4] = ["session_id", "session_data", "session_time", "expires_time"];

/// Durable per-client session state.
///
/// The four mandatory fields are plain struct fields. Anything a
/// [`SessionModel`] adds on top (for example `remote_ip`) lives in `extra`
/// and is flattened into the same JSON object on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique key.
    pub session_id: String,
    /// Opaque encoded session payload.
    pub session_data: String,
    /// Unix seconds of the last write.
    pub session_time: i64,
    /// TTL in seconds, measured from `session_time`.
    pub expires_time: i64,
    /// Model-defined extension fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SessionRecord {
    /// A record with zeroed mandatory fields and no extensions.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            session_data: String::new(),
            session_time: 0,
            expires_time: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Whether the TTL has elapsed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.session_time > self.expires_time
    }

    /// Read an extension field.
    pub fn extra_value(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Set an extension field. Mandatory field names are refused.
    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) -> ApiSealResult<()> {
        let key = key.into();
        if MANDATORY_FIELDS.contains(&key.as_str()) {
            return Err(ApiSealError::runtime(format!(
                "'{key}' is a mandatory session field, not an extension"
            )));
        }
        self.extra.insert(key, value);
        Ok(())
    }

    /// Encode as the stored JSON payload.
    pub fn to_json(&self) -> ApiSealResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored JSON payload.
    ///
    /// A payload missing a mandatory field is a runtime error, not an empty
    /// session.
    pub fn from_json(raw: &str) -> ApiSealResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ApiSealError::runtime(format!("stored session is not decodable: {e}")))
    }
}

/// Supplies the default extension fields of a session model.
pub trait ExtraProperties: Send + Sync {
    /// Extension field names and their defaults.
    fn extra_properties(&self) -> BTreeMap<String, Value>;
}

/// Adds `remote_ip`, defaulting to an empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteIpProperties;

impl ExtraProperties for RemoteIpProperties {
    fn extra_properties(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        props.insert("remote_ip".to_string(), Value::String(String::new()));
        props
    }
}

/// Template that stamps out session records.
#[derive(Debug, Clone)]
pub struct SessionModel {
    name: String,
    defaults: Arc<BTreeMap<String, Value>>,
}

impl SessionModel {
    /// Mandatory fields only.
    pub fn bare() -> Self {
        Self {
            name: "bare".to_string(),
            defaults: Arc::new(BTreeMap::new()),
        }
    }

    /// A named model whose extension defaults come from `props`.
    ///
    /// Defaults naming a mandatory field are rejected.
    pub fn with_extra(name: impl Into<String>, props: &dyn ExtraProperties) -> ApiSealResult<Self> {
        let name = name.into();
        let defaults = props.extra_properties();
        if let Some(clash) = defaults
            .keys()
            .find(|k| MANDATORY_FIELDS.contains(&k.as_str()))
        {
            return Err(ApiSealError::config(format!(
                "session model '{name}' redefines mandatory field '{clash}'"
            )));
        }
        Ok(Self {
            name,
            defaults: Arc::new(defaults),
        })
    }

    /// Resolve a configured model name (`default` or `bare`).
    pub fn from_name(name: &str) -> ApiSealResult<Self> {
        match name {
            "default" => Ok(Self::default()),
            "bare" => Ok(Self::bare()),
            other => Err(ApiSealError::config(format!("unknown session model '{other}'"))),
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh record: zeroed mandatory fields plus the model defaults.
    pub fn blank(&self, session_id: impl Into<String>) -> SessionRecord {
        let mut record = SessionRecord::new(session_id);
        record.extra = (*self.defaults).clone();
        record
    }

    /// Fill in defaults the stored record lacks. Stored values win.
    pub fn fit(&self, mut stored: SessionRecord) -> SessionRecord {
        for (key, value) in self.defaults.iter() {
            stored
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        stored
    }

    /// Extension field names, sorted.
    pub fn extension_keys(&self) -> Vec<String> {
        self.defaults.keys().cloned().collect()
    }
}

impl Default for SessionModel {
    /// Mandatory fields plus `remote_ip`.
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            defaults: Arc::new(RemoteIpProperties.extra_properties()),
        }
    }
}
