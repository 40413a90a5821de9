use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use sleuth_core::error::{Result, SleuthError};

/// One extracted video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub path: PathBuf,
    /// Position in the video as `hh:mm:ss.mmm`.
    pub timestamp: String,
}

/// A downloaded video held in a scoped temp directory.
///
/// Everything lives under the [`tempfile::TempDir`], so dropping the
/// source releases the download, the extracted frames, and the audio on
/// every exit path, including a failure partway through `open`.
#[derive(Debug)]
pub struct VideoSource {
    temp: tempfile::TempDir,
    video_path: PathBuf,
    pub title: String,
    pub description: String,
    pub caption: Option<String>,
}

impl VideoSource {
    /// Download the video, its metadata, and any English captions.
    pub async fn open(url: &str) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        debug!(url, dir = %temp.path().display(), "downloading video");

        let output = Command::new("yt-dlp")
            .arg("-f")
            .arg("best[ext=mp4]/best")
            .arg("-o")
            .arg(temp.path().join("video.%(ext)s"))
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs")
            .arg("en,en-US")
            .arg("--dump-json")
            .arg("--no-simulate")
            .arg("--quiet")
            .arg(url)
            .output()
            .await
            .map_err(|e| SleuthError::Media(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(SleuthError::Media(format!(
                "yt-dlp failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let title = metadata["title"].as_str().unwrap_or("Unknown Title").to_string();
        let description = metadata["description"]
            .as_str()
            .unwrap_or("No description available")
            .to_string();

        let video_path = find_video_file(temp.path())?;
        let caption = read_caption(temp.path());

        Ok(Self {
            temp,
            video_path,
            title,
            description,
            caption,
        })
    }

    /// Extract frames at the given rate, ordered by position.
    pub async fn extract_frames(&self, fps: f64) -> Result<Vec<Frame>> {
        let frames_dir = self
            .temp
            .path()
            .join(format!("frames_fps_{}", fps.to_string().replace('.', "_")));
        tokio::fs::create_dir_all(&frames_dir).await?;

        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(&self.video_path)
            .arg("-vf")
            .arg(format!("fps={}", fps))
            .arg(frames_dir.join("frame_%04d.png"))
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .output()
            .await
            .map_err(|e| SleuthError::Media(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(SleuthError::Media(format!(
                "frame extraction failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&frames_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(num) = parse_frame_number(&name) {
                numbered.push((num, entry.path()));
            }
        }
        numbered.sort_by_key(|(num, _)| *num);

        let frames = numbered
            .into_iter()
            .map(|(num, path)| Frame {
                path,
                timestamp: format_timestamp(num, fps),
            })
            .collect();
        Ok(frames)
    }

}

fn find_video_file(dir: &Path) -> Result<PathBuf> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("video.")
            && !name.ends_with(".json")
            && !name.ends_with(".vtt")
            && !name.ends_with(".srt")
        {
            return Ok(entry.path());
        }
    }
    Err(SleuthError::Media("downloaded video file not found".into()))
}

/// Read the best caption file in the directory, auto-generated ones first.
fn read_caption(dir: &Path) -> Option<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".vtt") || n.ends_with(".srt"))
        .collect();

    let best = pick_caption_file(&mut names)?;
    match std::fs::read_to_string(dir.join(&best)) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(file = %best, error = %e, "could not read caption file");
            None
        }
    }
}

fn pick_caption_file(names: &mut [String]) -> Option<String> {
    names.sort_by_key(|n| !n.to_lowercase().contains("auto"));
    names.first().cloned()
}

fn parse_frame_number(name: &str) -> Option<u32> {
    name.strip_prefix("frame_")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

fn format_timestamp(frame_num: u32, fps: f64) -> String {
    let total_seconds = frame_num as f64 / fps;
    let hours = (total_seconds / 3600.0) as u32;
    let minutes = ((total_seconds % 3600.0) / 60.0) as u32;
    let seconds = total_seconds % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        // Frame 1 at 0.2 fps is 5 seconds in.
        assert_eq!(format_timestamp(1, 0.2), "00:00:05.000");
        assert_eq!(format_timestamp(720, 1.0), "00:12:00.000");
        assert_eq!(format_timestamp(7201, 2.0), "01:00:00.500");
    }

    #[test]
    fn test_parse_frame_number() {
        assert_eq!(parse_frame_number("frame_0042.png"), Some(42));
        assert_eq!(parse_frame_number("frame_0042.jpg"), None);
        assert_eq!(parse_frame_number("audio.mp3"), None);
    }

    #[test]
    fn test_pick_caption_prefers_auto() {
        let mut names = vec![
            "video.en.vtt".to_string(),
            "video.en.auto.vtt".to_string(),
        ];
        assert_eq!(
            pick_caption_file(&mut names),
            Some("video.en.auto.vtt".to_string())
        );

        let mut none: Vec<String> = vec![];
        assert_eq!(pick_caption_file(&mut none), None);
    }
}
