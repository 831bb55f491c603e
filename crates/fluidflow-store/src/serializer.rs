use serde::{Deserialize, Serialize};

use crate::StoreError;
use crate::record::{ActivityRecord, SCHEMA_VERSION};

/// Converts activity snapshots to and from bytes.
///
/// Serializers must be lossless: `deserialize(serialize(r)) == r`.
pub trait TaskSerializer: Send + Sync {
  fn serialize(&self, activity: &ActivityRecord) -> Result<Vec<u8>, StoreError>;

  fn deserialize(&self, bytes: &[u8]) -> Result<ActivityRecord, StoreError>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
  schema_version: u32,
  activity: &'a ActivityRecord,
}

#[derive(Deserialize)]
struct Envelope {
  schema_version: u32,
  activity: ActivityRecord,
}

/// JSON serializer wrapping each snapshot in a versioned envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
  pretty: bool,
}

impl JsonSerializer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Emit indented JSON.
  pub fn pretty() -> Self {
    Self { pretty: true }
  }
}

impl TaskSerializer for JsonSerializer {
  fn serialize(&self, activity: &ActivityRecord) -> Result<Vec<u8>, StoreError> {
    let envelope = EnvelopeRef {
      schema_version: SCHEMA_VERSION,
      activity,
    };
    let bytes = if self.pretty {
      serde_json::to_vec_pretty(&envelope)?
    } else {
      serde_json::to_vec(&envelope)?
    };
    Ok(bytes)
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<ActivityRecord, StoreError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.schema_version != SCHEMA_VERSION {
      return Err(StoreError::UnsupportedSchemaVersion {
        found: envelope.schema_version,
        supported: SCHEMA_VERSION,
      });
    }
    Ok(envelope.activity)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::record::{ComponentRecord, KindRecord};
  use crate::types::{ActivityState, ActivityType};

  fn delayed() -> ActivityRecord {
    ActivityRecord {
      id: Uuid::new_v4(),
      state: ActivityState::Delayed,
      activity_type: ActivityType::Delayed,
      result: Some(json!({"ticket": 42})),
      kind: KindRecord::Delayed {
        work: ComponentRecord::new("open-ticket", json!({"queue": "ops"})),
        monitor: ComponentRecord::new("ticket-status", json!({"ticket": 42})),
      },
    }
  }

  #[test]
  fn test_envelope_carries_schema_version() {
    let bytes = JsonSerializer::new().serialize(&delayed()).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["schema_version"], json!(SCHEMA_VERSION));
    assert_eq!(value["activity"]["state"], json!("delayed"));
  }

  #[test]
  fn test_pretty_and_compact_decode_identically() {
    let record = delayed();
    let compact = JsonSerializer::new().serialize(&record).unwrap();
    let pretty = JsonSerializer::pretty().serialize(&record).unwrap();
    assert_ne!(compact, pretty);
    assert_eq!(JsonSerializer::new().deserialize(&pretty).unwrap(), record);
  }

  #[test]
  fn test_rejects_unknown_schema_version() {
    let record = delayed();
    let bytes = serde_json::to_vec(&json!({
      "schema_version": SCHEMA_VERSION + 1,
      "activity": record,
    }))
    .unwrap();

    let err = JsonSerializer::new().deserialize(&bytes).unwrap_err();
    assert!(matches!(
      err,
      StoreError::UnsupportedSchemaVersion { found, supported }
        if found == SCHEMA_VERSION + 1 && supported == SCHEMA_VERSION
    ));
  }

  #[test]
  fn test_rejects_malformed_bytes() {
    let err = JsonSerializer::new().deserialize(b"not json").unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
  }
}
