//! Octave schedule: the coarse-to-fine sequence of image sizes

use crate::error::{DreamError, Result};

/// One pyramid level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Octave {
    /// Scale exponent, from `-num_octaves` up to 0
    pub exponent: i32,
    pub height: usize,
    pub width: usize,
}

/// Ordered pyramid levels, smallest first, always ending at the original size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctaveSchedule {
    octaves: Vec<Octave>,
}

impl OctaveSchedule {
    /// Build the schedule for an image of `(height, width)`.
    ///
    /// Level `n` has size `original * scale^n`, truncated to whole pixels.
    pub fn new(original: (usize, usize), octave_scale: f64, num_octaves: usize) -> Result<Self> {
        validate(octave_scale)?;
        let (height, width) = original;
        if height == 0 || width == 0 {
            return Err(DreamError::InvalidImage(format!(
                "cannot dream on an empty {height}x{width} image"
            )));
        }

        let num_octaves = i32::try_from(num_octaves).map_err(|_| {
            DreamError::InvalidScaleSchedule(format!("{num_octaves} octaves is too many"))
        })?;

        let level = |exponent: i32| {
            let factor = octave_scale.powi(exponent);
            let octave = Octave {
                exponent,
                height: (height as f64 * factor) as usize,
                width: (width as f64 * factor) as usize,
            };
            if octave.height == 0 || octave.width == 0 {
                return Err(DreamError::InvalidScaleSchedule(format!(
                    "octave {exponent} shrinks {height}x{width} to {}x{} pixels",
                    octave.height, octave.width
                )));
            }
            Ok(octave)
        };

        // The deepest level is checked before the rest are built.
        let mut octaves = vec![level(-num_octaves)?];
        for exponent in (-num_octaves + 1)..=0 {
            octaves.push(level(exponent)?);
        }

        Ok(Self { octaves })
    }

    pub fn octaves(&self) -> &[Octave] {
        &self.octaves
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Octave> {
        self.octaves.iter()
    }

    pub fn len(&self) -> usize {
        self.octaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octaves.is_empty()
    }

    /// The full-resolution level
    pub fn last(&self) -> Option<&Octave> {
        self.octaves.last()
    }
}

impl<'a> IntoIterator for &'a OctaveSchedule {
    type Item = &'a Octave;
    type IntoIter = std::slice::Iter<'a, Octave>;

    fn into_iter(self) -> Self::IntoIter {
        self.octaves.iter()
    }
}

/// Check scale parameters before any compute
pub fn validate(octave_scale: f64) -> Result<()> {
    if !octave_scale.is_finite() || octave_scale <= 0.0 {
        return Err(DreamError::InvalidScaleSchedule(format!(
            "octave scale must be a positive number, got {octave_scale}"
        )));
    }
    Ok(())
}
