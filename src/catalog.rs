//! File-backed click sounds.
//!
//! Every `.wav` or `.mp3` file in a directory is a sound whose id is the
//! file stem. WAV is read with `hound`, MP3 with `minimp3`.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::click::SoundCatalog;
use crate::dsp::sampler::SampleBuffer;

const EXTENSIONS: [&str; 2] = ["wav", "mp3"];

/// Where user sound files live by default, e.g.
/// `~/.local/share/practice-core/sounds` on Linux.
pub fn default_dir() -> Option<PathBuf> {
    ProjectDirs::from("net", "practice", "practice-core")
        .map(|dirs| dirs.data_dir().join("sounds"))
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    dir: PathBuf,
}

impl FileCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCatalog { dir: dir.into() }
    }

    /// Catalog over [`default_dir`], if the platform has one.
    pub fn user_default() -> Option<Self> {
        default_dir().map(FileCatalog::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sound_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            log::debug!("sound directory {} not readable", self.dir.display());
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && extension(path).is_some())
            .collect();
        files.sort();
        files
    }

    fn find(&self, id: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{id}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl SoundCatalog for FileCatalog {
    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sound_files()
            .iter()
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .collect();
        ids.dedup();
        ids
    }

    fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    fn decode(&mut self, id: &str) -> Result<SampleBuffer, String> {
        let path = self
            .find(id)
            .ok_or_else(|| format!("no sound file for '{id}' in {}", self.dir.display()))?;
        match extension(&path) {
            Some("wav") => load_wav(&path),
            Some("mp3") => load_mp3(&path),
            _ => Err(format!("unsupported file {}", path.display())),
        }
    }
}

fn extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSIONS.iter().copied().find(|known| *known == ext)
}

fn load_wav(path: &Path) -> Result<SampleBuffer, String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| e.to_string())?
        }
    };
    Ok(SampleBuffer::from_f32(&samples, spec.channels, spec.sample_rate))
}

fn load_mp3(path: &Path) -> Result<SampleBuffer, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut decoder = minimp3::Decoder::new(BufReader::new(file));
    let mut pcm: Vec<i16> = Vec::new();
    let mut format: Option<(u16, u32)> = None;
    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                format.get_or_insert((frame.channels as u16, frame.sample_rate as u32));
                pcm.extend_from_slice(&frame.data);
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
    let (channels, sample_rate) =
        format.ok_or_else(|| format!("{} has no audio frames", path.display()))?;
    Ok(SampleBuffer::from_i16(&pcm, channels, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("practice-core-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            for _ in 0..channels {
                writer.write_sample(16384i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn lists_and_decodes_wav() {
        let dir = temp_dir("wav");
        write_wav(&dir.join("tick.wav"), 2, 2205);
        write_wav(&dir.join("block.wav"), 1, 441);
        fs::write(dir.join("notes.txt"), "not audio").unwrap();

        let mut catalog = FileCatalog::new(&dir);
        assert_eq!(catalog.ids(), vec!["block".to_string(), "tick".to_string()]);
        assert!(catalog.contains("tick"));
        assert!(!catalog.contains("notes"));
        fs::remove_file(dir.join("block.wav")).unwrap();
        assert!(!catalog.contains("block"));

        let buf = catalog.decode("tick").unwrap();
        assert_eq!(buf.sample_rate, 22050);
        assert_eq!(buf.len(), 2205);
        assert!((buf.duration() - 0.1).abs() < 1e-9);
        assert!((buf.data[0] - 0.5).abs() < 1e-3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_and_corrupt_files_fail() {
        let dir = temp_dir("bad");
        fs::write(dir.join("broken.wav"), b"RIFF nonsense").unwrap();

        let mut catalog = FileCatalog::new(&dir);
        assert!(catalog.decode("broken").is_err());
        assert!(catalog.decode("absent").is_err());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_empty() {
        let catalog = FileCatalog::new("/nonexistent/practice-core/sounds");
        assert!(catalog.ids().is_empty());
    }
}
