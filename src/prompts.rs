use crate::model::ShotSpec;

pub const SHOT_LIST_SYSTEM_PROMPT: &str = "\
You are a Script Analysis Engine. Your task is to break down the provided \
creative input (script, treatment, or concept) into a sequence of discrete \
shots. For each shot, provide a unique 'shot_id' (e.g., 'ep1_scene1_shot1') \
and a concise, 1-2 sentence natural language 'pitch' describing the shot's \
action and mood. Your final output MUST be a single, valid JSON array of \
objects, where each object contains only the 'shot_id' and 'pitch' keys. Do \
not output any other text or explanation.";

pub const SHOT_SPEC_SYSTEM_PROMPT: &str = "\
You are a Script Analysis Engine that transforms unstructured creative input \
into structured production specifications for a video generation system.

YOUR TASK:
1. Read the user's FULL SCRIPT CONTEXT.
2. Based on the FULL SCRIPT CONTEXT and the PITCH for a single shot, generate \
ONE complete, valid JSON object following the schema below.
3. The 'shot_id' in the generated JSON MUST EXACTLY MATCH the provided shot_id.
4. Output only the single, valid JSON object. No other text, explanation, or \
markdown formatting. Double quotes inside a string value must be escaped.

JSON SCHEMA:
{
  \"shot_id\": \"string\",
  \"scene\": {
    \"context\": \"environmental description (location, time of day, atmosphere)\",
    \"visual_style\": \"e.g. cinematic realism, high-contrast noir\",
    \"lighting\": \"e.g. hard key from right, golden hour backlight\",
    \"mood\": \"e.g. serene, tense, isolation\",
    \"aspect_ratio\": \"16:9 or 9:16\",
    \"duration_s\": 4, 6 or 8
  },
  \"character\": {
    \"name\": \"character identifier from script\",
    \"gender_age\": \"e.g. male, mid-30s\",
    \"description_lock\": \"phrase to lock identity across shots\",
    \"behavior\": \"physical actions, posture, gait\",
    \"expression\": \"facial micro-expressions\"
  },
  \"camera\": {
    \"shot_call\": \"shot type + angle, e.g. Low-Angle Medium Shot\",
    \"movement\": \"motion + speed, e.g. Slow Dolly In over 5s\",
    \"negatives\": \"comma-separated artifact preventions\"
  },
  \"audio\": {
    \"dialogue\": \"TTS-normalized spoken words\",
    \"delivery\": \"pitch/pace/quality\",
    \"ambience\": \"environmental sounds\",
    \"sfx\": \"timed sound effects\"
  },
  \"flags\": {
    \"continuity_lock\": true,
    \"do_not\": [], \"anti_artifacts\": [], \"conflicts\": [], \"warnings\": [], \"cv_updates\": []
  }
}

CONTINUITY RULES:
- character.description_lock is mandatory and must be repeated verbatim for \
the same character across shots.
- Follow the 180-degree rule; match lighting source and color temperature \
between adjacent shots.
- Shot pacing guide: extreme wide 7-8s, wide 6-8s, medium 5-7s, close-up \
3-5s, extreme close-up 3-4s.";

pub fn spec_user_prompt(pitch: &str, shot_id: &str, full_script: &str) -> String {
    format!(
        "FULL SCRIPT CONTEXT:\n---\n{}\n---\n\n\
         SHOT TO GENERATE:\n---\nshot_id: \"{}\"\npitch: \"{}\"\n---",
        full_script, shot_id, pitch
    )
}

pub fn keyframe_prompt(spec: &ShotSpec) -> String {
    format!(
        "Generate a single, cinematic keyframe image of the character '{name}'. \
         Style: {style}. Scene: {context}. Action: {behavior}. Shot: {shot_call}. \
         Lighting: {lighting}. When using reference images, ensure the character \
         depicted matches the name '{name}'.",
        name = spec.character.name,
        style = spec.scene.visual_style,
        context = spec.scene.context,
        behavior = spec.character.behavior,
        shot_call = spec.camera.shot_call,
        lighting = spec.scene.lighting,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioSpec, CameraSpec, CharacterSpec, SceneSpec, SpecFlags};

    #[test]
    fn test_spec_user_prompt_contains_shot_identity() {
        let prompt = spec_user_prompt("Robot wakes", "s1", "A robot wakes up.");
        assert!(prompt.contains("shot_id: \"s1\""));
        assert!(prompt.contains("pitch: \"Robot wakes\""));
        assert!(prompt.contains("A robot wakes up."));
    }

    #[test]
    fn test_keyframe_prompt_pulls_from_spec() {
        let spec = ShotSpec {
            shot_id: "s1".to_string(),
            scene: SceneSpec {
                context: "Server room".to_string(),
                visual_style: "Cinematic realism".to_string(),
                lighting: "Cold blue glow".to_string(),
                mood: "Isolation".to_string(),
                aspect_ratio: "16:9".to_string(),
                duration_s: 6,
            },
            character: CharacterSpec {
                name: "ARI".to_string(),
                gender_age: String::new(),
                description_lock: "Chrome faceplate".to_string(),
                behavior: "Sits up slowly".to_string(),
                expression: "Blank".to_string(),
            },
            camera: CameraSpec {
                shot_call: "Eye-Level Close-Up".to_string(),
                movement: "Static".to_string(),
                negatives: None,
            },
            audio: AudioSpec {
                dialogue: String::new(),
                delivery: "None".to_string(),
                ambience: None,
                sfx: None,
            },
            flags: SpecFlags::default(),
        };

        let prompt = keyframe_prompt(&spec);
        assert!(prompt.contains("'ARI'"));
        assert!(prompt.contains("Server room"));
        assert!(prompt.contains("Eye-Level Close-Up"));
    }
}
