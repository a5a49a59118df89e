use crate::model::{ReferenceImage, Shot, ShotPitch, ShotSpec, ShotStatus};
use anyhow::{bail, Result};
use indexmap::IndexMap;

/// The live shot book: an ordered map keyed by shot id. Insertion order is
/// the display order and is never re-sorted.
#[derive(Default, Clone, Debug)]
pub struct ShotBook {
    shots: IndexMap<String, Shot>,
}

impl ShotBook {
    pub fn from_pitches(pitches: Vec<ShotPitch>) -> Self {
        let mut shots = IndexMap::with_capacity(pitches.len());
        for item in pitches {
            shots.insert(item.id.clone(), Shot::new(item.id, item.pitch));
        }
        Self { shots }
    }

    pub fn get(&self, id: &str) -> Option<&Shot> {
        self.shots.get(id)
    }

    /// Applies a mutation to one shot. Returns false if the shot is unknown.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Shot),
    {
        match self.shots.get_mut(id) {
            Some(shot) => {
                f(shot);
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.shots.keys().cloned().collect()
    }

    pub fn shots(&self) -> impl Iterator<Item = &Shot> {
        self.shots.values()
    }

    pub fn snapshot(&self) -> Vec<Shot> {
        self.shots.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn clear(&mut self) {
        self.shots.clear();
    }

    /// Marks a shot approved. Only meaningful for a shot that has a keyframe
    /// and is not failed.
    pub fn approve(&mut self, id: &str) -> Result<()> {
        let Some(shot) = self.shots.get_mut(id) else {
            bail!("Unknown shot: {}", id);
        };
        if shot.keyframe.is_none() {
            bail!("Shot {} has no keyframe to approve", id);
        }
        if shot.status == ShotStatus::Failed {
            bail!("Shot {} is in a failed state", id);
        }
        shot.status = ShotStatus::Approved;
        Ok(())
    }

    pub fn edit_spec(&mut self, id: &str, spec: ShotSpec) -> Result<()> {
        let Some(shot) = self.shots.get_mut(id) else {
            bail!("Unknown shot: {}", id);
        };
        shot.spec = Some(spec);
        Ok(())
    }

    /// Rebinds a shot's reference images. An approved shot drops back to
    /// needs-review since its keyframe may no longer match its ingredients.
    pub fn set_reference_images(&mut self, id: &str, images: Vec<ReferenceImage>) -> Result<()> {
        let Some(shot) = self.shots.get_mut(id) else {
            bail!("Unknown shot: {}", id);
        };
        shot.reference_images = images;
        if shot.status == ShotStatus::Approved {
            shot.status = ShotStatus::NeedsReview;
        }
        Ok(())
    }
}
