use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::detection::domain::dead_zone::DeadZone;
use crate::detection::domain::face_detection::FaceDetection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::model_loader::{LoadError, ModelLoader};
use crate::detection::infrastructure::onnx_model_loader::OnnxModelLoader;
use crate::shared::frame::Frame;

use super::config::SessionConfig;
use super::error::{DetectError, SessionError};
use super::readiness::{lock, LoadStatus, OnFailed, ReadinessGate};

/// A per-caller face detection session.
///
/// Owns the model load (started eagerly when `immediate` is set) and gates
/// every detection call on it. Cheap to share behind an `Arc`.
pub struct FaceDetectorSession {
    config: SessionConfig,
    loader: Arc<dyn ModelLoader>,
    gate: Arc<ReadinessGate>,
}

impl FaceDetectorSession {
    /// Session backed by the ONNX tiny face detector at `config.model`.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let loader = OnnxModelLoader::new(config.model.clone());
        Self::with_loader(config, Arc::new(loader))
    }

    /// Session backed by a custom loader.
    pub fn with_loader(
        config: SessionConfig,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let session = Self {
            config,
            loader,
            gate: Arc::new(ReadinessGate::new()),
        };
        if session.config.immediate {
            session.spawn_initialize();
        }
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Load the model, or join a load already in progress.
    ///
    /// Returns immediately once a load has succeeded. After a failure, calling
    /// this again retries.
    pub fn initialize(&self) -> Result<(), SessionError> {
        self.gate
            .ensure_loaded(self.loader.as_ref(), OnFailed::Retry)
            .map(|_| ())
    }

    /// Readiness flag: true once the model has loaded.
    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn status(&self) -> LoadStatus {
        self.gate.status()
    }

    /// Receive every load status change, starting with the current one.
    pub fn watch(&self) -> Receiver<LoadStatus> {
        self.gate.watch()
    }

    /// Wait for a load started elsewhere (e.g. by `immediate`).
    ///
    /// `Ok(false)` means the timeout elapsed first; the load keeps running.
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<bool, SessionError> {
        self.gate.wait_timeout(timeout)
    }

    /// Detect the single best face and require it to sit outside the dead zone.
    ///
    /// `dead_zone_ratio` is the share of the frame width excluded on each side,
    /// in `[0, 0.5)`. Waits for the model when it is still loading, and starts
    /// the load when nothing has. A previous load failure is reported as
    /// [`DetectError::ModelLoad`]; call [`initialize`](Self::initialize) to retry.
    pub fn detect_single_face(
        &self,
        frame: &Frame,
        dead_zone_ratio: f64,
    ) -> Result<FaceDetection, DetectError> {
        let zone =
            DeadZone::new(dead_zone_ratio).ok_or(DetectError::InvalidDeadZone(dead_zone_ratio))?;
        self.detect_within(frame, zone)
    }

    /// [`detect_single_face`](Self::detect_single_face) without a dead zone.
    pub fn detect_single_face_centered(
        &self,
        frame: &Frame,
    ) -> Result<FaceDetection, DetectError> {
        self.detect_within(frame, DeadZone::NONE)
    }

    fn detect_within(&self, frame: &Frame, zone: DeadZone) -> Result<FaceDetection, DetectError> {
        let options = self.config.detector_options();

        let detector = self
            .gate
            .ensure_loaded(self.loader.as_ref(), OnFailed::Report)?;
        let best = lock(&*detector).detect_single(frame, &options)?;

        let Some(face) = best else {
            log::debug!("frame {}: no face", frame.index());
            return Err(DetectError::NoFaceFound);
        };

        if let Err(intrusion) = zone.check(&face) {
            log::debug!(
                "frame {}: face at {:.1}..{:.1} intrudes on the {} dead zone",
                frame.index(),
                face.bounding_box.left,
                face.bounding_box.right,
                intrusion.side
            );
            return Err(DetectError::FaceOutOfBounds {
                side: intrusion.side,
                left: face.bounding_box.left,
                right: face.bounding_box.right,
                left_bound: intrusion.left_bound,
                right_bound: intrusion.right_bound,
                score: face.score,
            });
        }

        log::debug!("frame {}: accepted face (score {:.3})", frame.index(), face.score);
        Ok(face)
    }

    fn spawn_initialize(&self) {
        let gate = self.gate.clone();
        let loader = self.loader.clone();
        let spawned = thread::Builder::new()
            .name("facegate-model-load".into())
            .spawn(move || {
                // Failures are recorded in the gate and surfaced to callers.
                let _ = gate.ensure_loaded(loader.as_ref(), OnFailed::Retry);
            });
        if let Err(e) = spawned {
            log::warn!("Could not start background model load, loading on first use: {e}");
        }
    }
}

/// Lets callers hand any detector to a session without a loading step.
pub struct PreloadedLoader {
    detector: Mutex<Option<Box<dyn FaceDetector>>>,
}

impl PreloadedLoader {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            detector: Mutex::new(Some(detector)),
        }
    }
}

impl ModelLoader for PreloadedLoader {
    fn load(&self) -> Result<Box<dyn FaceDetector>, LoadError> {
        lock(&self.detector)
            .take()
            .ok_or_else(|| "preloaded detector was already handed out".into())
    }

    fn describe(&self) -> String {
        "preloaded face detector".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::dead_zone::Side;
    use crate::detection::domain::face_detection::BoundingBox;
    use crate::detection::domain::face_detector::{DetectorError, DetectorOptions, InputSize};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed face (or none) and records the options it was called with.
    struct ScriptedDetector {
        face: Option<BoundingBox>,
        score: f64,
        seen: Arc<Mutex<Vec<DetectorOptions>>>,
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(
            &mut self,
            frame: &Frame,
            options: &DetectorOptions,
        ) -> Result<Vec<FaceDetection>, DetectorError> {
            self.seen.lock().unwrap().push(*options);
            Ok(self
                .face
                .filter(|_| self.score >= options.score_threshold)
                .map(|b| FaceDetection::new(b, frame.width(), frame.height(), self.score))
                .into_iter()
                .collect())
        }
    }

    struct ScriptedLoader {
        face: Option<BoundingBox>,
        score: f64,
        failures: usize,
        delay: Duration,
        loads: AtomicUsize,
        seen: Arc<Mutex<Vec<DetectorOptions>>>,
    }

    impl ScriptedLoader {
        fn with_face(face: Option<BoundingBox>) -> Self {
            Self {
                face,
                score: 0.9,
                failures: 0,
                delay: Duration::ZERO,
                loads: AtomicUsize::new(0),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for ScriptedLoader {
        fn load(&self) -> Result<Box<dyn FaceDetector>, LoadError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if n < self.failures {
                return Err("network unreachable".into());
            }
            Ok(Box::new(ScriptedDetector {
                face: self.face,
                score: self.score,
                seen: self.seen.clone(),
            }))
        }
    }

    fn lazy() -> SessionConfig {
        SessionConfig::default().immediate(false)
    }

    fn frame(width: u32) -> Frame {
        Frame::new(vec![0u8; width as usize * 3], width, 1, 3, 0)
    }

    fn face(left: f64, right: f64) -> Option<BoundingBox> {
        Some(BoundingBox::new(left, 0.0, right, 1.0))
    }

    fn session(loader: &Arc<ScriptedLoader>, config: SessionConfig) -> FaceDetectorSession {
        FaceDetectorSession::with_loader(config, loader.clone()).unwrap()
    }

    #[test]
    fn test_not_ready_before_initialize() {
        let loader = Arc::new(ScriptedLoader::with_face(None));
        let s = session(&loader, lazy());
        assert!(!s.is_ready());
        assert_eq!(s.status(), LoadStatus::Idle);
        assert_eq!(loader.loads(), 0);
    }

    #[test]
    fn test_ready_after_initialize() {
        let loader = Arc::new(ScriptedLoader::with_face(None));
        let s = session(&loader, lazy());
        s.initialize().unwrap();
        assert!(s.is_ready());
        s.initialize().unwrap();
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_accepts_centered_face() {
        let loader = Arc::new(ScriptedLoader::with_face(face(100.0, 500.0)));
        let s = session(&loader, lazy());
        let det = s.detect_single_face(&frame(640), 0.1).unwrap();
        assert_eq!(det.bounding_box.left, 100.0);
        assert_eq!(det.image_width, 640);
        assert_eq!(det.score, 0.9);
    }

    #[test]
    fn test_rejects_face_in_left_margin() {
        let loader = Arc::new(ScriptedLoader::with_face(face(50.0, 500.0)));
        let s = session(&loader, lazy());
        let err = s.detect_single_face(&frame(640), 0.1).unwrap_err();
        assert!(matches!(
            err,
            DetectError::FaceOutOfBounds { side: Side::Left, left_bound, .. } if left_bound == 64.0
        ));
        assert_eq!(err.user_message(), "未检测到人脸");
    }

    #[test]
    fn test_rejects_face_in_right_margin_regardless_of_score() {
        let mut loader = ScriptedLoader::with_face(face(100.0, 600.0));
        loader.score = 0.999;
        let loader = Arc::new(loader);
        let s = session(&loader, lazy());
        let err = s.detect_single_face(&frame(640), 0.1).unwrap_err();
        assert!(matches!(err, DetectError::FaceOutOfBounds { side: Side::Right, .. }));
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.1)]
    #[case(0.3)]
    #[case(0.45)]
    fn test_boundary_is_inclusive(#[case] ratio: f64) {
        let width = 1000u32;
        let (l, r) = DeadZone::new(ratio).unwrap().bounds(width);
        let loader = Arc::new(ScriptedLoader::with_face(face(l, r)));
        let s = session(&loader, lazy());
        assert!(s.detect_single_face(&frame(width), ratio).is_ok());
    }

    #[test]
    fn test_no_face_is_rejected() {
        let loader = Arc::new(ScriptedLoader::with_face(None));
        let s = session(&loader, lazy());
        let err = s.detect_single_face(&frame(640), 0.0).unwrap_err();
        assert!(matches!(err, DetectError::NoFaceFound));
        assert!(err.is_rejection());
        assert_eq!(err.user_message(), "未检测到人脸");
    }

    #[test]
    fn test_zero_dead_zone_accepts_edge_to_edge_face() {
        let loader = Arc::new(ScriptedLoader::with_face(face(0.0, 640.0)));
        let s = session(&loader, lazy());
        assert!(s.detect_single_face_centered(&frame(640)).is_ok());
    }

    #[rstest]
    #[case(face(-30.0, 300.0), Side::Left)]
    #[case(face(400.0, 660.0), Side::Right)]
    fn test_zero_dead_zone_rejects_face_past_frame_edge(
        #[case] face: Option<BoundingBox>,
        #[case] side: Side,
    ) {
        let loader = Arc::new(ScriptedLoader::with_face(face));
        let s = session(&loader, lazy());
        let err = s.detect_single_face_centered(&frame(640)).unwrap_err();
        assert!(matches!(err, DetectError::FaceOutOfBounds { side: got, .. } if got == side));
        assert_eq!(err.user_message(), "未检测到人脸");
    }

    #[rstest]
    #[case(0.5)]
    #[case(0.8)]
    #[case(-0.1)]
    #[case(f64::NAN)]
    fn test_invalid_dead_zone_rejected_before_loading(#[case] ratio: f64) {
        let loader = Arc::new(ScriptedLoader::with_face(face(100.0, 500.0)));
        let s = session(&loader, lazy());
        let err = s.detect_single_face(&frame(640), ratio).unwrap_err();
        assert!(matches!(err, DetectError::InvalidDeadZone(_)));
        assert_eq!(loader.loads(), 0);
    }

    #[test]
    fn test_uses_configured_options() {
        let loader = Arc::new(ScriptedLoader::with_face(face(100.0, 500.0)));
        let s = session(&loader, lazy().score_threshold(0.8).input_size(InputSize::Lg));
        s.detect_single_face(&frame(640), 0.0).unwrap();
        let seen = loader.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[DetectorOptions::new(InputSize::Lg, 0.8)]);
    }

    #[test]
    fn test_score_below_threshold_is_no_face() {
        let loader = Arc::new(ScriptedLoader::with_face(face(100.0, 500.0)));
        let s = session(&loader, lazy().score_threshold(0.95));
        let err = s.detect_single_face(&frame(640), 0.0).unwrap_err();
        assert!(matches!(err, DetectError::NoFaceFound));
    }

    #[test]
    fn test_detect_starts_lazy_load() {
        let loader = Arc::new(ScriptedLoader::with_face(face(100.0, 500.0)));
        let s = session(&loader, lazy());
        s.detect_single_face(&frame(640), 0.0).unwrap();
        assert!(s.is_ready());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_detect_waits_for_immediate_load() {
        let mut loader = ScriptedLoader::with_face(face(100.0, 500.0));
        loader.delay = Duration::from_millis(50);
        let loader = Arc::new(loader);
        let s = session(&loader, SessionConfig::default());

        assert!(s.detect_single_face(&frame(640), 0.1).is_ok());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_immediate_session_becomes_ready() {
        let loader = Arc::new(ScriptedLoader::with_face(None));
        let s = session(&loader, SessionConfig::default());
        assert!(s.wait_until_ready(Duration::from_secs(5)).unwrap());
        assert!(s.is_ready());
    }

    #[test]
    fn test_initialize_during_failing_immediate_load_does_not_reload() {
        let mut loader = ScriptedLoader::with_face(None);
        loader.failures = usize::MAX;
        loader.delay = Duration::from_millis(100);
        let loader = Arc::new(loader);
        let s = session(&loader, SessionConfig::default());
        let rx = s.watch();
        while rx.recv().unwrap() == LoadStatus::Idle {}

        assert!(s.initialize().is_err());
        assert!(s.wait_until_ready(Duration::from_secs(5)).is_err());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_failed_load_reported_then_retried_by_initialize() {
        let mut loader = ScriptedLoader::with_face(face(100.0, 500.0));
        loader.failures = 1;
        let loader = Arc::new(loader);
        let s = session(&loader, lazy());

        let err = s.initialize().unwrap_err();
        assert!(err.to_string().contains("network unreachable"));
        assert!(!s.is_ready());

        let err = s.detect_single_face(&frame(640), 0.0).unwrap_err();
        assert!(matches!(err, DetectError::ModelLoad(_)));
        assert!(!err.is_rejection());
        assert_eq!(loader.loads(), 1);

        s.initialize().unwrap();
        assert!(s.is_ready());
        assert!(s.detect_single_face(&frame(640), 0.0).is_ok());
    }

    #[test]
    fn test_concurrent_detections_share_one_load() {
        let mut loader = ScriptedLoader::with_face(face(100.0, 500.0));
        loader.delay = Duration::from_millis(30);
        let loader = Arc::new(loader);
        let s = Arc::new(session(&loader, lazy()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = s.clone();
                thread::spawn(move || s.detect_single_face(&frame(640), 0.1).is_ok())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let loader = Arc::new(ScriptedLoader::with_face(None));
        let result = FaceDetectorSession::with_loader(lazy().score_threshold(2.0), loader);
        assert!(matches!(result, Err(SessionError::InvalidConfig(_))));
    }

    #[test]
    fn test_watch_reports_load() {
        let loader = Arc::new(ScriptedLoader::with_face(None));
        let s = session(&loader, lazy());
        let rx = s.watch();
        s.initialize().unwrap();
        let last = rx.try_iter().last().unwrap();
        assert_eq!(last, LoadStatus::Ready);
    }

    #[test]
    fn test_preloaded_loader() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let detector = ScriptedDetector {
            face: face(10.0, 20.0),
            score: 0.7,
            seen,
        };
        let s = FaceDetectorSession::with_loader(
            lazy(),
            Arc::new(PreloadedLoader::new(Box::new(detector))),
        )
        .unwrap();
        let det = s.detect_single_face_centered(&frame(100)).unwrap();
        assert_eq!(det.score, 0.7);
    }
}
