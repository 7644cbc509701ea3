//! Multi-page 16-bit TIFF sequences.

use super::error::RecordingError;
use super::window::WindowSpec;
use crate::capture::Frame;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Appends one TIFF page per frame.
pub struct SequenceWriter {
    path: PathBuf,
    encoder: TiffEncoder<File>,
    /// Second handle on the output, used to sync on close.
    file: File,
    spec: WindowSpec,
    pixel_bits: u32,
    frames_written: u64,
    started: Instant,
}

impl SequenceWriter {
    /// Creates the output file and checks the window fits the sensor.
    pub fn create(
        path: impl Into<PathBuf>,
        spec: WindowSpec,
        sensor_width: u32,
        sensor_height: u32,
        pixel_bits: u32,
    ) -> Result<Self, RecordingError> {
        spec.check_fits(sensor_width, sensor_height)?;

        let path = path.into();
        let file = File::create(&path).map_err(|e| RecordingError::io(&path, e))?;
        let handle = file.try_clone().map_err(|e| RecordingError::io(&path, e))?;
        let encoder = TiffEncoder::new(file)?;

        tracing::info!(path = %path.display(), "Sequence recording opened");
        Ok(Self {
            path,
            encoder,
            file: handle,
            spec,
            pixel_bits,
            frames_written: 0,
            started: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Writes `frame` as the next page with index, time and exposure metadata.
    pub fn write(&mut self, frame: &Frame, exposure_ms: f64) -> Result<(), RecordingError> {
        let data = self.spec.apply(frame, self.pixel_bits)?;
        let (width, height) = self.spec.output_size();
        let elapsed = frame
            .timestamp()
            .saturating_duration_since(self.started)
            .as_secs_f64();
        let description = format!(
            "frame={} exposure_ms={} t={:.3}",
            self.frames_written, exposure_ms, elapsed
        );

        let mut image = self.encoder.new_image::<colortype::Gray16>(width, height)?;
        image
            .encoder()
            .write_tag(Tag::ImageDescription, description.as_str())?;
        image.write_data(&data)?;

        self.frames_written += 1;
        tracing::trace!(frame = self.frames_written, "Sequence page written");
        Ok(())
    }

    /// Closes the file, returning the number of pages written.
    pub fn finish(self) -> Result<u64, RecordingError> {
        let Self {
            path,
            encoder,
            file,
            frames_written,
            ..
        } = self;
        drop(encoder);
        file.sync_all().map_err(|e| RecordingError::io(&path, e))?;

        tracing::info!(path = %path.display(), frames = frames_written, "Sequence recording closed");
        Ok(frames_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_pages_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.tif");
        let spec = WindowSpec::new(2, 2, 1);
        let mut writer = SequenceWriter::create(&path, spec, 4, 4, 10).unwrap();

        for v in [1, 2, 3] {
            writer.write(&Frame::filled(4, 4, v), 100.0).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 3);

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        let mut pages = Vec::new();
        loop {
            assert_eq!(decoder.dimensions().unwrap(), (2, 2));
            let description = decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap();
            match decoder.read_image().unwrap() {
                DecodingResult::U16(data) => pages.push((description, data)),
                _ => panic!("expected 16-bit page"),
            }
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().unwrap();
        }

        assert_eq!(pages.len(), 3);
        assert!(pages[0].0.starts_with("frame=0 exposure_ms=100"));
        assert!(pages[2].0.starts_with("frame=2 "));
        // 10-bit data shifted left by 6
        assert_eq!(pages[1].1, vec![2 << 6; 4]);
    }

    #[test]
    fn test_window_must_fit_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WindowSpec::new(8, 8, 1);
        assert!(matches!(
            SequenceWriter::create(dir.path().join("x.tif"), spec, 4, 4, 10),
            Err(RecordingError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WindowSpec::new(2, 2, 1);
        let path = dir.path().join("missing").join("x.tif");
        assert!(matches!(
            SequenceWriter::create(path, spec, 4, 4, 10),
            Err(RecordingError::Io { .. })
        ));
    }
}
