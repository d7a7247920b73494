//! Payload schema registry.
//!
//! Maps `(kind, schema_version)` to a typed payload decoder. The process
//! registers every supported schema once at startup via
//! [`register_all_schemas`]; after that the registry is immutable. Code
//! paths that validate payloads go through [`SchemaRegistry::global`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::kind::ArtifactKind;
use crate::payload::{
    ArtifactPayload, FaceDetectionV1, MetadataV1, ObjectDetectionV1, OcrTextV1,
    PlaceClassificationV1, SceneV1, TranscriptSegmentV1,
};

type DecodeFn = fn(&Value) -> Result<ArtifactPayload, serde_json::Error>;

/// One registered schema.
#[derive(Clone)]
pub struct SchemaEntry {
    /// Schema display name (e.g. "TranscriptSegmentV1")
    pub name: &'static str,
    decode: DecodeFn,
}

impl std::fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaEntry").field("name", &self.name).finish()
    }
}

/// Registry of payload schemas keyed by `(kind, version)`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<(ArtifactKind, i64), SchemaEntry>,
}

impl SchemaRegistry {
    /// Create an empty registry. Production code uses [`SchemaRegistry::global`];
    /// this exists for the init path and for tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, populated on first access.
    pub fn global() -> &'static SchemaRegistry {
        static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let mut registry = SchemaRegistry::new();
            register_all_schemas(&mut registry)
                .unwrap_or_else(|e| panic!("schema registration failed: {e}"));
            registry
        })
    }

    /// Register a schema. Fails if the `(kind, version)` pair is already
    /// registered or `version < 1`.
    pub fn register(
        &mut self,
        kind: ArtifactKind,
        version: i64,
        entry: SchemaEntry,
    ) -> ModelResult<()> {
        if version < 1 {
            return Err(ModelError::InvalidSchemaVersion(version));
        }
        if self.entries.contains_key(&(kind, version)) {
            return Err(ModelError::SchemaAlreadyRegistered {
                kind: kind.to_string(),
                version,
            });
        }
        self.entries.insert((kind, version), entry);
        Ok(())
    }

    /// Validate a payload against the registered schema, returning the
    /// decoded typed payload.
    pub fn validate(&self, kind: ArtifactKind, version: i64, payload: &Value) -> ModelResult<ArtifactPayload> {
        let entry = self
            .entries
            .get(&(kind, version))
            .ok_or_else(|| ModelError::UnknownSchema {
                kind: kind.to_string(),
                version,
            })?;
        (entry.decode)(payload).map_err(|e| ModelError::payload_invalid(kind.to_string(), version, e.to_string()))
    }

    /// Serialize a payload to canonical JSON bytes, validating it first.
    pub fn serialize(&self, kind: ArtifactKind, version: i64, payload: &Value) -> ModelResult<Vec<u8>> {
        let decoded = self.validate(kind, version, payload)?;
        let value = match decoded {
            ArtifactPayload::TranscriptSegment(p) => serde_json::to_vec(&p)?,
            ArtifactPayload::Scene(p) => serde_json::to_vec(&p)?,
            ArtifactPayload::ObjectDetection(p) => serde_json::to_vec(&p)?,
            ArtifactPayload::FaceDetection(p) => serde_json::to_vec(&p)?,
            ArtifactPayload::PlaceClassification(p) => serde_json::to_vec(&p)?,
            ArtifactPayload::OcrText(p) => serde_json::to_vec(&p)?,
            ArtifactPayload::VideoMetadata(p) => serde_json::to_vec(&p)?,
        };
        Ok(value)
    }

    /// Whether a `(kind, version)` pair is registered.
    pub fn is_registered(&self, kind: ArtifactKind, version: i64) -> bool {
        self.entries.contains_key(&(kind, version))
    }

    /// Look up a registered schema.
    pub fn get_schema(&self, kind: ArtifactKind, version: i64) -> Option<&SchemaEntry> {
        self.entries.get(&(kind, version))
    }

    /// All registered `(kind, version)` pairs.
    pub fn list_registered(&self) -> Vec<(ArtifactKind, i64)> {
        self.entries.keys().copied().collect()
    }

    /// The newest registered version for a kind.
    pub fn current_version(&self, kind: ArtifactKind) -> Option<i64> {
        self.entries
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
            .max()
    }
}

fn decode<T>(value: &Value) -> Result<T, serde_json::Error>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value.clone())
}

/// Register all supported artifact schemas.
///
/// Called once during process startup; every kind the platform produces
/// must appear here.
pub fn register_all_schemas(registry: &mut SchemaRegistry) -> ModelResult<()> {
    registry.register(
        ArtifactKind::TranscriptSegment,
        1,
        SchemaEntry {
            name: "TranscriptSegmentV1",
            decode: |v| decode::<TranscriptSegmentV1>(v).map(ArtifactPayload::TranscriptSegment),
        },
    )?;

    registry.register(
        ArtifactKind::Scene,
        1,
        SchemaEntry {
            name: "SceneV1",
            decode: |v| decode::<SceneV1>(v).map(ArtifactPayload::Scene),
        },
    )?;

    registry.register(
        ArtifactKind::ObjectDetection,
        1,
        SchemaEntry {
            name: "ObjectDetectionV1",
            decode: |v| decode::<ObjectDetectionV1>(v).map(ArtifactPayload::ObjectDetection),
        },
    )?;

    registry.register(
        ArtifactKind::FaceDetection,
        1,
        SchemaEntry {
            name: "FaceDetectionV1",
            decode: |v| decode::<FaceDetectionV1>(v).map(ArtifactPayload::FaceDetection),
        },
    )?;

    registry.register(
        ArtifactKind::PlaceClassification,
        1,
        SchemaEntry {
            name: "PlaceClassificationV1",
            decode: |v| decode::<PlaceClassificationV1>(v).map(ArtifactPayload::PlaceClassification),
        },
    )?;

    registry.register(
        ArtifactKind::OcrText,
        1,
        SchemaEntry {
            name: "OcrTextV1",
            decode: |v| decode::<OcrTextV1>(v).map(ArtifactPayload::OcrText),
        },
    )?;

    registry.register(
        ArtifactKind::VideoMetadata,
        1,
        SchemaEntry {
            name: "MetadataV1",
            decode: |v| decode::<MetadataV1>(v).map(ArtifactPayload::VideoMetadata),
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let mut r = SchemaRegistry::new();
        register_all_schemas(&mut r).unwrap();
        r
    }

    #[test]
    fn all_kinds_registered_at_v1() {
        let r = registry();
        for kind in ArtifactKind::ALL {
            assert!(r.is_registered(kind, 1), "{kind} v1 missing");
            assert_eq!(r.current_version(kind), Some(1));
        }
        assert_eq!(r.list_registered().len(), ArtifactKind::ALL.len());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut r = registry();
        let err = r.register(
            ArtifactKind::Scene,
            1,
            SchemaEntry {
                name: "SceneV1",
                decode: |v| decode::<SceneV1>(v).map(ArtifactPayload::Scene),
            },
        );
        assert!(matches!(
            err,
            Err(ModelError::SchemaAlreadyRegistered { .. })
        ));
    }

    #[test]
    fn version_below_one_rejected() {
        let mut r = SchemaRegistry::new();
        let err = r.register(
            ArtifactKind::Scene,
            0,
            SchemaEntry {
                name: "SceneV0",
                decode: |v| decode::<SceneV1>(v).map(ArtifactPayload::Scene),
            },
        );
        assert!(matches!(err, Err(ModelError::InvalidSchemaVersion(0))));
    }

    #[test]
    fn validate_accepts_well_formed_payload() {
        let r = registry();
        let payload = json!({"label": "person", "confidence": 0.95});
        let decoded = r
            .validate(ArtifactKind::ObjectDetection, 1, &payload)
            .unwrap();
        match decoded {
            ArtifactPayload::ObjectDetection(d) => {
                assert_eq!(d.label, "person");
                assert!((d.confidence - 0.95).abs() < f64::EPSILON);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_malformed_payload() {
        let r = registry();
        // missing required `confidence`
        let payload = json!({"label": "person"});
        let err = r.validate(ArtifactKind::ObjectDetection, 1, &payload);
        assert!(matches!(err, Err(ModelError::PayloadInvalid { .. })));
    }

    #[test]
    fn validate_rejects_unknown_version() {
        let r = registry();
        let payload = json!({"text": "hello"});
        let err = r.validate(ArtifactKind::TranscriptSegment, 99, &payload);
        assert!(matches!(err, Err(ModelError::UnknownSchema { .. })));
    }

    #[test]
    fn serialize_produces_canonical_json() {
        let r = registry();
        let payload = json!({"text": "hello", "extra_field": true});
        let bytes = r
            .serialize(ArtifactKind::TranscriptSegment, 1, &payload)
            .unwrap();
        let round: TranscriptSegmentV1 = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(round.text, "hello");
        // unknown input fields are not carried into the canonical form
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("extra_field").is_none());
    }

    #[test]
    fn global_registry_is_initialized_once() {
        let a = SchemaRegistry::global();
        let b = SchemaRegistry::global();
        assert!(std::ptr::eq(a, b));
        assert!(a.is_registered(ArtifactKind::VideoMetadata, 1));
    }
}
