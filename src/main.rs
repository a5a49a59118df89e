use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indicatif::ProgressBar;
use inquire::{Select, Text};
use log::info;
use script2storyboard::activity::LogCategory;
use script2storyboard::config::Config;
use script2storyboard::generation::GeminiClient;
use script2storyboard::model::{ReferenceImage, Shot, ShotStatus};
use script2storyboard::pipeline::Pipeline;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid Gemini settings.");
            return Err(e);
        }
    };
    config.ensure_directories()?;

    let script = fs::read_to_string(&config.script_file)
        .with_context(|| format!("Failed to read script file: {}", config.script_file))?;
    let references = load_reference_images(&config.reference_folder)?;
    println!("Loaded {} reference image(s).", references.len());

    let mut api_key = config.api_key();
    if api_key.is_empty() {
        api_key = prompt_api_key()?;
        config.gemini.api_key = api_key.clone();
        config.save()?;
        println!("Configuration saved.");
    }

    loop {
        let client = Arc::new(GeminiClient::new(
            &api_key,
            &config.gemini.text_model,
            &config.gemini.image_model,
        ));
        let pipeline = Pipeline::new(client);

        run_with_progress(&pipeline, &script, references.clone()).await?;
        print_activity_log(&pipeline);

        if let Some(err) = pipeline.last_run_error() {
            eprintln!("Error: {}", err.message);
            if err.needs_credentials {
                // Replay the same inputs once the user supplies a new key.
                api_key = prompt_api_key()?;
                config.gemini.api_key = api_key.clone();
                config.save()?;
                println!("Configuration saved.");
                continue;
            }
            let choice = Select::new(
                "Shot list generation failed. What next?",
                vec!["Try again", "Quit"],
            )
            .prompt()?;
            if choice == "Try again" {
                continue;
            }
            return Ok(());
        }

        review_loop(&pipeline).await?;
        export_approved(&pipeline.approved_shots(), &config.output_folder)?;
        return Ok(());
    }
}

/// Runs the pipeline in a background task while rendering live status read
/// from the shot book.
async fn run_with_progress(
    pipeline: &Pipeline,
    script: &str,
    references: Vec<ReferenceImage>,
) -> Result<()> {
    let runner = pipeline.clone();
    let script_owned = script.to_string();
    let handle = tokio::spawn(async move {
        // Run-level failures are held in the pipeline for display.
        let _ = runner.run(&script_owned, references).await;
    });

    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("Analyzing script to create shot list...");

    while !handle.is_finished() {
        let shots = pipeline.shots();
        if !shots.is_empty() {
            let done = shots
                .iter()
                .filter(|s| {
                    matches!(
                        s.status,
                        ShotStatus::NeedsReview | ShotStatus::Approved | ShotStatus::Failed
                    )
                })
                .count();
            if let Some(current) = shots.iter().find(|s| s.status.is_generating()) {
                bar.set_message(format!(
                    "[{}/{}] {} ({:?})",
                    done,
                    shots.len(),
                    current.id,
                    current.status
                ));
            }
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    handle.await.context("Generation task panicked")?;
    bar.finish_and_clear();
    info!("Pipeline run finished");
    Ok(())
}

fn print_activity_log(pipeline: &Pipeline) {
    for entry in pipeline.log_entries() {
        let marker = match entry.category {
            LogCategory::Error => "!",
            LogCategory::Success => "+",
            _ => " ",
        };
        println!("[{}] {} {}", entry.timestamp, marker, entry.message);
    }
}

/// Interactive review of generated shots: approve, retry failed or
/// unsatisfying keyframes, or leave the rest for a later run.
async fn review_loop(pipeline: &Pipeline) -> Result<()> {
    loop {
        let pending: Vec<Shot> = pipeline
            .shots()
            .into_iter()
            .filter(|s| matches!(s.status, ShotStatus::NeedsReview | ShotStatus::Failed))
            .collect();
        if pending.is_empty() {
            break;
        }

        let mut options: Vec<String> = pending
            .iter()
            .map(|s| format!("{} [{:?}] {}", s.id, s.status, s.pitch))
            .collect();
        options.push("Done reviewing".to_string());

        // Selection by index; shot ids never round-trip through the
        // rendered labels.
        let selection = Select::new("Select a shot to review:", options).raw_prompt()?;
        if selection.index >= pending.len() {
            break;
        }
        let shot = &pending[selection.index];
        let shot_id = shot.id.clone();

        if let Some(message) = &shot.error_message {
            println!("Last error: {}", message);
        }
        let actions = if shot.status == ShotStatus::Failed {
            vec!["Retry keyframe", "Skip"]
        } else {
            vec!["Approve", "Retry keyframe", "Skip"]
        };
        match Select::new("Action:", actions).prompt()? {
            "Approve" => {
                pipeline.approve(&shot_id)?;
                println!("Approved {}.", shot_id);
            }
            "Retry keyframe" => {
                if let Err(e) = pipeline.retry_image(&shot_id).await {
                    println!("Cannot retry {}: {}", shot_id, e);
                    continue;
                }
                match pipeline.shots().iter().find(|s| s.id == shot_id) {
                    Some(s) if s.status == ShotStatus::NeedsReview => {
                        println!("Keyframe regenerated for {}.", shot_id);
                    }
                    Some(s) => {
                        println!(
                            "Retry failed for {}: {}",
                            shot_id,
                            s.error_message.as_deref().unwrap_or("unknown error")
                        );
                    }
                    None => {}
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Writes each approved shot's spec as pretty JSON and its keyframe as a PNG,
/// named by shot id.
fn export_approved(approved: &[Shot], output_folder: &str) -> Result<()> {
    if approved.is_empty() {
        println!("No approved shots to export.");
        return Ok(());
    }

    for shot in approved {
        if let Some(spec) = &shot.spec {
            let spec_path = Path::new(output_folder).join(format!("{}.json", shot.id));
            fs::write(&spec_path, serde_json::to_string_pretty(spec)?)?;
        }
        if let Some(keyframe) = &shot.keyframe {
            let bytes = BASE64
                .decode(keyframe)
                .with_context(|| format!("Invalid keyframe data for shot {}", shot.id))?;
            fs::write(
                Path::new(output_folder).join(format!("{}.png", shot.id)),
                bytes,
            )?;
        }
    }

    println!(
        "Exported {} approved shot(s) to {}",
        approved.len(),
        output_folder
    );
    Ok(())
}

fn prompt_api_key() -> Result<String> {
    let key = Text::new("Enter your Gemini API key:").prompt()?;
    Ok(key.trim().to_string())
}

fn load_reference_images(folder: &str) -> Result<Vec<ReferenceImage>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(folder)
        .with_context(|| format!("Failed to read reference folder: {}", folder))?
    {
        let path = entry?.path();
        if mime_for_extension(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut images = Vec::new();
    for path in paths {
        let mime_type = mime_for_extension(&path).unwrap_or_default();
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read image: {:?}", path))?;
        images.push(ReferenceImage {
            data: BASE64.encode(bytes),
            mime_type,
        });
    }
    Ok(images)
}

fn mime_for_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png".to_string()),
        "jpg" | "jpeg" => Some("image/jpeg".to_string()),
        "webp" => Some("image/webp".to_string()),
        _ => None,
    }
}
