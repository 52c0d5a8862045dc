use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use uuid::Uuid;

/// Uncompressed RGBA frame as produced by a device
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if rgba.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug)]
pub struct MediaTrack {
    kind: TrackKind,
    label: String,
    live: AtomicBool,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }
}

struct StreamShared {
    tracks: Vec<MediaTrack>,
    frame: Mutex<Option<RawFrame>>,
}

impl StreamShared {
    fn video_live(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.kind() == TrackKind::Video && t.is_live())
    }
}

/// Live device stream. Frames are written through a [`FrameSink`] by whoever
/// drives the device and read back as point-in-time snapshots.
pub struct MediaStream {
    id: Uuid,
    shared: Arc<StreamShared>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shared: Arc::new(StreamShared {
                tracks,
                frame: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.shared.tracks
    }

    pub fn is_active(&self) -> bool {
        self.shared.tracks.iter().any(MediaTrack::is_live)
    }

    /// (0, 0) until the first frame has been decoded.
    pub fn dimensions(&self) -> (u32, u32) {
        match self.shared.frame.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|f| (f.width, f.height))
                .unwrap_or((0, 0)),
            Err(_) => (0, 0),
        }
    }

    pub fn latest_frame(&self) -> Option<RawFrame> {
        self.shared.frame.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn frame_sink(&self) -> FrameSink {
        FrameSink {
            shared: self.shared.clone(),
        }
    }

    /// Ends every track. Safe to call more than once.
    pub fn stop(&self) {
        for track in &self.shared.tracks {
            track.stop();
        }
        if let Ok(mut guard) = self.shared.frame.lock() {
            guard.take();
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.shared.tracks)
            .finish()
    }
}

/// Producer side of a [`MediaStream`]
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<StreamShared>,
}

impl FrameSink {
    /// Replaces the latest frame. Returns false once the video track is stopped.
    pub fn push(&self, frame: RawFrame) -> bool {
        if !self.shared.video_live() {
            return false;
        }
        match self.shared.frame.lock() {
            Ok(mut guard) => {
                *guard = Some(frame);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream() -> MediaStream {
        MediaStream::new(vec![MediaTrack::new(TrackKind::Video, "test camera")])
    }

    #[test]
    fn test_raw_frame_rejects_wrong_length() {
        assert!(RawFrame::new(2, 2, vec![0; 16]).is_some());
        assert!(RawFrame::new(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_dimensions_zero_until_first_frame() {
        let stream = video_stream();
        assert_eq!(stream.dimensions(), (0, 0));

        let sink = stream.frame_sink();
        assert!(sink.push(RawFrame::new(4, 2, vec![7; 32]).unwrap()));
        assert_eq!(stream.dimensions(), (4, 2));
    }

    #[test]
    fn test_stop_ends_tracks_and_rejects_frames() {
        let stream = MediaStream::new(vec![
            MediaTrack::new(TrackKind::Video, "cam"),
            MediaTrack::new(TrackKind::Audio, "mic"),
        ]);
        let sink = stream.frame_sink();
        sink.push(RawFrame::new(1, 1, vec![0; 4]).unwrap());

        stream.stop();
        stream.stop();

        assert!(!stream.is_active());
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
        assert_eq!(stream.dimensions(), (0, 0));
        assert!(!sink.push(RawFrame::new(1, 1, vec![0; 4]).unwrap()));
    }
}
