use serde::{Deserialize, Serialize};

/// Lifecycle of a single shot inside a run.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShotStatus {
    /// Waiting for spec generation.
    QueuedForSpec,
    /// Spec generation in progress.
    GeneratingSpec,
    /// Spec stored, keyframe not yet requested.
    QueuedForImage,
    /// Keyframe generation in progress.
    GeneratingImage,
    /// Keyframe ready, awaiting user approval.
    NeedsReview,
    /// User approved.
    Approved,
    /// Spec or keyframe generation failed.
    Failed,
}

impl ShotStatus {
    pub fn is_generating(&self) -> bool {
        matches!(self, ShotStatus::GeneratingSpec | ShotStatus::GeneratingImage)
    }
}

/// A user-supplied image used to bias keyframe generation, stored as base64.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReferenceImage {
    pub data: String,
    pub mime_type: String,
}

/// One item of the decomposed shot list.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShotPitch {
    #[serde(rename = "shot_id")]
    pub id: String,
    pub pitch: String,
}

/// One unit of the storyboard.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Shot {
    pub id: String,
    pub pitch: String,
    pub status: ShotStatus,
    pub spec: Option<ShotSpec>,
    /// Rendered keyframe as base64.
    pub keyframe: Option<String>,
    pub error_message: Option<String>,
    /// The reference images bound to this shot when its keyframe was
    /// generated. Independent of the global pool once set.
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,
}

impl Shot {
    pub fn new(id: String, pitch: String) -> Self {
        Self {
            id,
            pitch,
            status: ShotStatus::QueuedForSpec,
            spec: None,
            keyframe: None,
            error_message: None,
            reference_images: Vec::new(),
        }
    }
}

/// Structured production specification for one shot. Field names follow the
/// JSON schema the model is prompted to emit.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShotSpec {
    pub shot_id: String,
    pub scene: SceneSpec,
    pub character: CharacterSpec,
    pub camera: CameraSpec,
    pub audio: AudioSpec,
    #[serde(default)]
    pub flags: SpecFlags,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SceneSpec {
    pub context: String,
    #[serde(default)]
    pub visual_style: String,
    pub lighting: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_duration")]
    pub duration_s: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CharacterSpec {
    pub name: String,
    #[serde(default)]
    pub gender_age: String,
    pub description_lock: String,
    pub behavior: String,
    pub expression: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CameraSpec {
    pub shot_call: String,
    pub movement: String,
    pub negatives: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AudioSpec {
    pub dialogue: String,
    pub delivery: String,
    pub ambience: Option<String>,
    pub sfx: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SpecFlags {
    #[serde(default)]
    pub continuity_lock: bool,
    #[serde(default)]
    pub do_not: Vec<String>,
    #[serde(default)]
    pub anti_artifacts: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub cv_updates: Vec<String>,
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_duration() -> u8 {
    6
}
