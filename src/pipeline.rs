use crate::book::ShotBook;
use crate::generation::GenerationClient;
use crate::activity::{ActivityLog, LogCategory, LogEntry};
use crate::model::{ReferenceImage, Shot, ShotSpec, ShotStatus};
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Run-level failure, held for display so the caller can replay the same
/// inputs (and re-select credentials when flagged).
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct RunError {
    pub message: String,
    pub needs_credentials: bool,
}

#[derive(Default)]
struct PipelineState {
    book: ShotBook,
    log: ActivityLog,
    /// Incremented at every run start; post-await mutations tagged with an
    /// older value are dropped.
    run_id: u64,
    last_run_error: Option<RunError>,
    global_references: Vec<ReferenceImage>,
    last_script: Option<String>,
}

/// Drives the sequential multi-stage generation pipeline. Sole writer of the
/// shot book and activity log during an active run; the display layer reads
/// snapshots and re-enters through the per-shot actions.
#[derive(Clone)]
pub struct Pipeline {
    client: Arc<dyn GenerationClient>,
    state: Arc<Mutex<PipelineState>>,
}

impl Pipeline {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(PipelineState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, PipelineState> {
        // No writer panics mid-update, so a poisoned lock still holds
        // consistent state; recover rather than propagate the poison.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` against the shared state unless the run has been superseded.
    fn with_state<T>(&self, run: u64, f: impl FnOnce(&mut PipelineState) -> T) -> Option<T> {
        let mut st = self.state();
        if st.run_id != run {
            return None;
        }
        Some(f(&mut st))
    }

    /// One end-to-end run: script → shot list → per-shot spec → per-shot
    /// keyframe, strictly sequentially. Per-shot failures are recorded on the
    /// shot and never abort the run; a shot-list failure aborts before any
    /// shot book exists. All per-shot results are observed via the shot book
    /// and log.
    pub async fn run(
        &self,
        script: &str,
        references: Vec<ReferenceImage>,
    ) -> Result<(), RunError> {
        let my_run = {
            let mut st = self.state();
            st.run_id += 1;
            st.book.clear();
            st.log.clear();
            st.last_run_error = None;
            st.global_references = references;
            st.last_script = Some(script.to_string());
            st.log
                .append("Starting new shot book generation...", LogCategory::Info);
            st.log
                .append("Analyzing script to create shot list...", LogCategory::Step);
            st.run_id
        };

        let shot_list = match self.client.generate_shot_list(script).await {
            Ok(list) => list,
            Err(e) => {
                let run_error = RunError {
                    message: format!("Shot list generation failed: {}", e),
                    needs_credentials: e.is_credential(),
                };
                self.with_state(my_run, |st| {
                    st.log.append(run_error.message.clone(), LogCategory::Error);
                    st.last_run_error = Some(run_error.clone());
                });
                return Err(run_error);
            }
        };

        // Publish the shot book immediately so callers can render progress
        // before any per-shot work begins.
        let ids: Vec<String> = shot_list.iter().map(|s| s.id.clone()).collect();
        if self
            .with_state(my_run, |st| {
                st.log.append(
                    format!(
                        "Successfully created shot list with {} shots.",
                        shot_list.len()
                    ),
                    LogCategory::Success,
                );
                st.book = ShotBook::from_pitches(shot_list);
            })
            .is_none()
        {
            return Ok(());
        }

        for id in ids {
            let pitch = match self.with_state(my_run, |st| {
                st.log
                    .append(format!("Processing shot: {}", id), LogCategory::Info);
                st.log.append("Generating shot spec...", LogCategory::Step);
                st.book.update(&id, |s| s.status = ShotStatus::GeneratingSpec);
                st.book.get(&id).map(|s| s.pitch.clone())
            }) {
                Some(Some(pitch)) => pitch,
                Some(None) => continue,
                None => return Ok(()),
            };

            match self.client.generate_spec(&pitch, &id, script).await {
                Ok(spec) => {
                    let current = self.with_state(my_run, |st| {
                        st.book.update(&id, |s| {
                            s.spec = Some(spec);
                            s.status = ShotStatus::QueuedForImage;
                        });
                        st.log
                            .append("Shot spec generated successfully.", LogCategory::Success);
                    });
                    if current.is_none() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let current = self.with_state(my_run, |st| {
                        st.book.update(&id, |s| {
                            s.status = ShotStatus::Failed;
                            s.error_message = Some(message.clone());
                        });
                        st.log.append(
                            format!("Failed to generate shot spec: {}", message),
                            LogCategory::Error,
                        );
                    });
                    if current.is_none() {
                        return Ok(());
                    }
                    continue;
                }
            }

            let staged = self.with_state(my_run, |st| {
                st.log.append("Generating keyframe...", LogCategory::Step);
                st.book
                    .update(&id, |s| s.status = ShotStatus::GeneratingImage);
                let spec = st.book.get(&id).and_then(|s| s.spec.clone());
                (spec, st.global_references.clone())
            });
            let (spec, references) = match staged {
                Some((Some(spec), references)) => (spec, references),
                Some((None, _)) => continue,
                None => return Ok(()),
            };

            match self.client.generate_keyframe(&spec, &references).await {
                Ok(image) => {
                    let current = self.with_state(my_run, |st| {
                        st.book.update(&id, |s| {
                            s.keyframe = Some(image);
                            s.reference_images = references;
                            s.status = ShotStatus::NeedsReview;
                            s.error_message = None;
                        });
                        st.log
                            .append("Keyframe generated. Ready for review.", LogCategory::Success);
                    });
                    if current.is_none() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let current = self.with_state(my_run, |st| {
                        st.book.update(&id, |s| {
                            s.status = ShotStatus::Failed;
                            s.error_message = Some(message.clone());
                        });
                        st.log.append(
                            format!("Failed to generate keyframe: {}", message),
                            LogCategory::Error,
                        );
                    });
                    if current.is_none() {
                        return Ok(());
                    }
                }
            }
        }

        self.with_state(my_run, |st| {
            st.log.append(
                "Shot book generation complete. Ready for your review.",
                LogCategory::Info,
            );
        });
        Ok(())
    }

    /// Re-runs the keyframe stage for one shot, using its bound reference
    /// images (or the global pool if none were bound yet). Legal only from
    /// `NeedsReview` or `Failed`; any other state is rejected, which also
    /// rules out racing a shot the main loop is still working on. A
    /// generation failure marks the shot `Failed` and returns Ok; the outcome
    /// is observed via the shot book.
    pub async fn retry_image(&self, shot_id: &str) -> Result<()> {
        let (my_run, spec, references) = {
            let mut st = self.state();
            let Some(shot) = st.book.get(shot_id) else {
                bail!("Unknown shot: {}", shot_id);
            };
            if !matches!(shot.status, ShotStatus::NeedsReview | ShotStatus::Failed) {
                bail!(
                    "Shot {} cannot be retried in its current state ({:?})",
                    shot_id,
                    shot.status
                );
            }
            let Some(spec) = shot.spec.clone() else {
                bail!(
                    "Shot {} has no spec; restart the run to regenerate it",
                    shot_id
                );
            };
            let references = if shot.reference_images.is_empty() {
                st.global_references.clone()
            } else {
                shot.reference_images.clone()
            };
            st.book.update(shot_id, |s| {
                s.status = ShotStatus::GeneratingImage;
                s.error_message = None;
            });
            st.log.append(
                format!("Retrying keyframe for shot: {}", shot_id),
                LogCategory::Step,
            );
            (st.run_id, spec, references)
        };

        match self.client.generate_keyframe(&spec, &references).await {
            Ok(image) => {
                self.with_state(my_run, |st| {
                    st.book.update(shot_id, |s| {
                        s.keyframe = Some(image);
                        s.reference_images = references;
                        s.status = ShotStatus::NeedsReview;
                        s.error_message = None;
                    });
                    st.log
                        .append("Keyframe generated. Ready for review.", LogCategory::Success);
                });
            }
            Err(e) => {
                let message = e.to_string();
                self.with_state(my_run, |st| {
                    st.book.update(shot_id, |s| {
                        s.status = ShotStatus::Failed;
                        s.error_message = Some(message.clone());
                    });
                    st.log.append(
                        format!("Failed to generate keyframe: {}", message),
                        LogCategory::Error,
                    );
                });
            }
        }
        Ok(())
    }

    pub fn approve(&self, shot_id: &str) -> Result<()> {
        self.state().book.approve(shot_id)
    }

    pub fn edit_spec(&self, shot_id: &str, spec: ShotSpec) -> Result<()> {
        self.state().book.edit_spec(shot_id, spec)
    }

    pub fn set_shot_reference_images(
        &self,
        shot_id: &str,
        images: Vec<ReferenceImage>,
    ) -> Result<()> {
        self.state().book.set_reference_images(shot_id, images)
    }

    pub fn set_global_reference_pool(&self, images: Vec<ReferenceImage>) {
        self.state().global_references = images;
    }

    pub fn shots(&self) -> Vec<Shot> {
        self.state().book.snapshot()
    }

    pub fn approved_shots(&self) -> Vec<Shot> {
        self.state()
            .book
            .shots()
            .filter(|s| s.status == ShotStatus::Approved)
            .cloned()
            .collect()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.state().log.entries().to_vec()
    }

    pub fn last_run_error(&self) -> Option<RunError> {
        self.state().last_run_error.clone()
    }

    /// Inputs of the last run, for replaying after a credential fix.
    pub fn last_inputs(&self) -> Option<(String, Vec<ReferenceImage>)> {
        let st = self.state();
        st.last_script
            .clone()
            .map(|script| (script, st.global_references.clone()))
    }
}
