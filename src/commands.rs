// Session commands
// Operations exposed to the front end and the CLI, one analysis session per project
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::classifier::{
    ClassifierExample, KnowledgeStore, Prediction, SpectralClassifier, SpectrumAnalysis,
    StoreReport,
};
use crate::config::AnalysisConfig;
use crate::measurement::{self, MeasurementFile, ZoneMarker};
use crate::pipeline::{LogSink, TraceBuilder, TraceSink};
use crate::residual::{wind_alerts, EmergenceScanner, LevelSummary, ScanReport};
use crate::spectrum::{SpectralWindowAggregator, SpectralWindowResult};
use crate::state::storage;
use crate::sync::{
    parse_audio_start, AudioResolver, AudioSyncOffset, AudioTimeSync, FolderResolver, SyncError,
};
use crate::timeline::{BandLevels, MeasurementSeries};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

fn no_data() -> CommandError {
    CommandError {
        message: "No measurement loaded".to_string(),
    }
}

/// What `load_project` found
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub session_id: Uuid,
    pub measurement_file: PathBuf,
    pub created_working_copy: bool,
    pub sha256: String,
    pub sample_count: usize,
    pub start_ts: Option<f64>,
    pub end_ts: Option<f64>,
    pub band_labels: Vec<String>,
    pub marker_count: usize,
    pub summary: LevelSummary,
    pub wind_alerts: Vec<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<AudioSyncOffset>,

    /// Why playback alignment is unavailable, when it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

/// Where to start audio playback for a timeline position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackTarget {
    pub audio_ref: String,
    pub path: PathBuf,
    pub position_ms: u64,
}

/// Measurement data a session works on
enum Source {
    Detached(MeasurementSeries),
    File(MeasurementFile),
}

/// One analysis session: a measurement series, the classifier, the audio
/// alignment and the last scan result
pub struct Session {
    id: Uuid,
    config: AnalysisConfig,
    source: Source,
    classifier: SpectralClassifier,
    resolver: Arc<dyn AudioResolver>,
    sink: Arc<dyn TraceSink>,
    sync: Option<AudioSyncOffset>,
    last_scan: Option<ScanReport>,
}

impl Session {
    /// Empty session with an in-memory classifier
    pub fn new(config: AnalysisConfig) -> Self {
        let classifier = SpectralClassifier::in_memory(&config.classifier);
        Session {
            id: Uuid::new_v4(),
            config,
            source: Source::Detached(MeasurementSeries::default()),
            classifier,
            resolver: Arc::new(FolderResolver::new(PathBuf::from("."))),
            sink: Arc::new(LogSink),
            sync: None,
            last_scan: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.classifier = self.classifier.with_sink(sink.clone());
        self.sink = sink;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn AudioResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn series(&self) -> &MeasurementSeries {
        match &self.source {
            Source::Detached(series) => series,
            Source::File(file) => file.series(),
        }
    }

    fn series_mut(&mut self) -> &mut MeasurementSeries {
        match &mut self.source {
            Source::Detached(series) => series,
            Source::File(file) => file.series_mut(),
        }
    }

    pub fn classifier(&self) -> &SpectralClassifier {
        &self.classifier
    }

    pub fn sync_offset(&self) -> Option<&AudioSyncOffset> {
        self.sync.as_ref()
    }

    pub fn last_scan(&self) -> Option<&ScanReport> {
        self.last_scan.as_ref()
    }

    // ==================== DATA ====================

    /// Work on an in-memory series (no file behind it)
    pub fn attach_series(&mut self, series: MeasurementSeries) {
        self.source = Source::Detached(series);
        self.sync = None;
        self.last_scan = None;
    }

    /// Open the knowledge store named in the configuration, or the one in the
    /// application data directory
    pub fn open_knowledge(&mut self) -> CommandResult<StoreReport> {
        let path = match &self.config.classifier.knowledge_file {
            Some(path) => path.clone(),
            None => storage::default_knowledge_path()?,
        };

        let (classifier, report) =
            SpectralClassifier::open(&self.config.classifier, KnowledgeStore::new(path))?;
        self.classifier = classifier.with_sink(self.sink.clone());
        Ok(report)
    }

    /// Load a project folder: working copy, series, fingerprint and audio sync
    pub fn load_project(&mut self, folder: &Path) -> CommandResult<ProjectInfo> {
        self.sink.emit(
            TraceBuilder::stage("load").start(format!("Opening project {}", folder.display())),
        );

        let files = measurement::discover(folder)?;
        let file = MeasurementFile::load(&files.measurement, &self.config.band_labels)?;
        let sha256 = storage::hash_file(&files.measurement)?;

        self.source = Source::File(file);
        self.resolver = Arc::new(FolderResolver::new(files.folder.clone()));
        self.sync = None;
        self.last_scan = None;

        let sync_error = match self.resolve_sync(None) {
            Ok(_) => None,
            Err(e) => {
                log::warn!("{}", e.message());
                Some(e.message)
            }
        };

        let series = self.series();
        let summary = LevelSummary::of_series(series);
        let alerts = wind_alerts(series.timestamps(), series.wind(), self.config.wind_limit_ms);

        let info = ProjectInfo {
            session_id: self.id,
            measurement_file: files.measurement,
            created_working_copy: files.created_copy,
            sha256,
            sample_count: series.len(),
            start_ts: series.start_ts(),
            end_ts: series.end_ts(),
            band_labels: series.band_labels().to_vec(),
            marker_count: measurement::markers(series).len(),
            summary,
            wind_alerts: alerts,
            sync: self.sync.clone(),
            sync_error,
        };

        self.sink.emit(TraceBuilder::stage("load").with_data(
            1.0,
            format!("Loaded {} samples", info.sample_count),
            serde_json::json!({
                "session_id": self.id.to_string(),
                "sha256": info.sha256,
                "samples": info.sample_count,
                "markers": info.marker_count,
            }),
        ));

        Ok(info)
    }

    /// Whole-series level statistics
    pub fn summary(&self) -> LevelSummary {
        LevelSummary::of_series(self.series())
    }

    pub fn wind_alerts(&self) -> Vec<f64> {
        let series = self.series();
        wind_alerts(series.timestamps(), series.wind(), self.config.wind_limit_ms)
    }

    // ==================== SCAN ====================

    fn scanner(&self) -> EmergenceScanner {
        EmergenceScanner::new(self.config.estimator(), self.config.scan.clone())
            .with_sink(self.sink.clone())
    }

    /// Residuals and emergences over the whole series
    pub fn run_expert_scan(&mut self) -> CommandResult<ScanReport> {
        let report = self.scanner().scan_series(self.series());
        self.last_scan = Some(report.clone());
        Ok(report)
    }

    /// Same scan on a blocking worker, over a copy of the series
    pub async fn scan_detached(&mut self) -> CommandResult<ScanReport> {
        let scanner = self.scanner();
        let series = self.series().clone();

        let report = tokio::task::spawn_blocking(move || scanner.scan_series(&series)).await?;
        self.last_scan = Some(report.clone());
        Ok(report)
    }

    // ==================== SPECTRUM ====================

    pub fn query_window(&self, ts: f64) -> SpectralWindowResult {
        SpectralWindowAggregator::new(self.config.window_secs).query(self.series(), ts)
    }

    pub fn predict(&self, bands: &BandLevels) -> CommandResult<Prediction> {
        Ok(self.classifier.predict(bands)?)
    }

    /// Analysis of the instantaneous spectrum at `ts`
    pub fn analyze_at(&self, ts: f64) -> CommandResult<SpectrumAnalysis> {
        let window = self.query_window(ts);
        if window.is_empty() {
            return Err(no_data());
        }
        Ok(self.classifier.analyze(&window.instant_levels())?)
    }

    pub fn learn(&mut self, bands: &BandLevels, label: &str) -> CommandResult<ClassifierExample> {
        Ok(self.classifier.learn(bands, label)?)
    }

    /// Learn from the spectrum of the sample nearest to `ts`
    pub fn learn_at(&mut self, ts: f64, label: &str) -> CommandResult<ClassifierExample> {
        let series = self.series();
        let idx = series.nearest(ts).ok_or_else(no_data)?;
        let bands = series.spectrum_at(idx).ok_or_else(no_data)?;
        self.learn(&bands, label)
    }

    // ==================== AUDIO ====================

    fn audio_sync(&self) -> AudioTimeSync {
        AudioTimeSync::new(self.config.sync.clone(), self.config.zone(), self.resolver.clone())
            .with_sink(self.sink.clone())
    }

    /// Align `filename` (default: the first audio reference of the series)
    /// with the start of the series
    pub fn resolve_sync(&mut self, filename: Option<&str>) -> CommandResult<AudioSyncOffset> {
        let series = self.series();
        let start = series.start_ts().ok_or_else(no_data)?;

        let reference = match filename {
            Some(name) => name.to_string(),
            None => (0..series.len())
                .find_map(|i| series.audio_ref(i))
                .map(str::to_string)
                .ok_or(SyncError::NoAudioReference)?,
        };

        let offset = self.audio_sync().resolve(start, &reference)?;
        self.sync = Some(offset.clone());
        Ok(offset)
    }

    /// Audio file and position to play for timeline position `ts`.
    ///
    /// Uses the audio reference of the nearest sample. When its name carries
    /// no start time, the first sample recorded into that file anchors it.
    pub fn playback_target(&self, ts: f64) -> CommandResult<PlaybackTarget> {
        let series = self.series();
        let idx = series.nearest(ts).ok_or_else(no_data)?;

        let reference = series
            .audio_ref(idx)
            .map(str::to_string)
            .or_else(|| self.sync.as_ref().map(|s| s.audio_ref.clone()))
            .ok_or(SyncError::NoAudioReference)?;

        let artifact = self
            .resolver
            .resolve(&reference)
            .ok_or_else(|| SyncError::MissingArtifact(reference.clone()))?;

        let audio_start_epoch = match parse_audio_start(&reference, &self.config.sync, &self.config.zone()) {
            Ok(epoch) => epoch,
            Err(_) => (0..series.len())
                .find(|&i| series.audio_ref(i) == Some(reference.as_str()))
                .map(|i| series.timestamps()[i])
                .ok_or(SyncError::NoAudioReference)?,
        };

        let offset = AudioSyncOffset {
            audio_start_epoch,
            time_offset: series.start_ts().unwrap_or(audio_start_epoch) - audio_start_epoch,
            audio_ref: reference.clone(),
            path: Some(artifact.path.clone()),
            duration_secs: artifact.duration_secs,
        };

        Ok(PlaybackTarget {
            audio_ref: reference,
            path: artifact.path,
            position_ms: offset.playback_position_ms(ts),
        })
    }

    // ==================== ZONES ====================

    pub fn markers(&self) -> Vec<ZoneMarker> {
        measurement::markers(self.series())
    }

    fn persist(&mut self) -> CommandResult<()> {
        if let Source::File(file) = &mut self.source {
            file.save()?;
        }
        Ok(())
    }

    pub fn annotate_zone(&mut self, start: f64, end: f64, label: &str) -> CommandResult<ZoneMarker> {
        let marker = measurement::annotate_zone(self.series_mut(), start, end, label)?;
        self.persist()?;
        log::info!("Zone added: {} at {}", marker.label, marker.ts);
        Ok(marker)
    }

    pub fn relabel_marker(&mut self, ts: f64, label: &str) -> CommandResult<ZoneMarker> {
        let marker = measurement::relabel_marker(self.series_mut(), ts, label)?;
        self.persist()?;
        log::info!("Zone relabelled: {} at {}", marker.label, marker.ts);
        Ok(marker)
    }

    pub fn delete_marker(&mut self, ts: f64) -> CommandResult<ZoneMarker> {
        let marker = measurement::delete_marker(self.series_mut(), ts)?;
        self.persist()?;
        log::info!("Zone deleted at {}", marker.ts);
        Ok(marker)
    }
}

/// Report printed by the command line front end
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub project: ProjectInfo,
    pub knowledge: StoreReport,
    pub scan: ScanReport,
}

/// Open the knowledge store, load a project folder and run the expert scan
pub fn analyze_project(session: &mut Session, folder: &Path) -> CommandResult<AnalysisReport> {
    let knowledge = session.open_knowledge()?;
    log::info!(
        "Knowledge store: {} examples loaded, {} rows skipped",
        knowledge.loaded,
        knowledge.skipped
    );

    let project = session.load_project(folder)?;
    let scan = session.run_expert_scan()?;

    Ok(AnalysisReport {
        project,
        knowledge,
        scan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MemorySink;
    use crate::sync::resolver::tests::write_silent_wav;
    use crate::timeline::Sample;
    use std::fs;
    use tempfile::TempDir;

    const START: f64 = 1766178000.0; // 2025-12-19 22:00 at UTC+1

    fn config(temp_dir: &TempDir) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.utc_offset_minutes = Some(60);
        config.band_labels = vec!["50Hz".to_string(), "4000Hz".to_string()];
        config.classifier.knowledge_file = Some(temp_dir.path().join("knowledge.csv"));
        config
    }

    /// 22:00 night survey: 1 h at 40 dB then 20 min at 55 dB, one sample a minute
    fn write_project(folder: &Path, with_audio: bool) {
        let mut csv = String::from("# Site test\nts;Date;dBA;50Hz;4000Hz;Audio_Ref;note\n");
        for i in 0..80 {
            let level = if i < 60 { "40,0" } else { "55,0" };
            let low = if i < 60 { "35,0" } else { "60,0" };
            csv.push_str(&format!(
                "{};x;{};{};20,0;2025-12-19_22h00_Audio.wav;\n",
                START as i64 + i * 60,
                level,
                low
            ));
        }
        fs::write(folder.join("survey.csv"), csv).unwrap();

        if with_audio {
            write_silent_wav(&folder.join("2025-12-19_22h00_Audio.wav"), 2);
        }
    }

    fn spectrum(low: f64, high: f64) -> BandLevels {
        [("50Hz".to_string(), low), ("4000Hz".to_string(), high)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_command_error_from_display() {
        let err: CommandError = SyncError::NoAudioReference.into();
        assert!(err.message().contains("no audio reference"));
    }

    #[test]
    fn test_load_project_and_scan() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        write_project(&project, true);

        let sink = Arc::new(MemorySink::new());
        let mut session = Session::new(config(&temp_dir)).with_sink(sink.clone());
        let info = session.load_project(&project).unwrap();

        assert!(info.created_working_copy);
        assert!(info.measurement_file.ends_with("survey_PRISM.csv"));
        assert_eq!(info.sample_count, 80);
        assert_eq!(info.sha256.len(), 64);
        assert_eq!(info.summary.min, 40.0);
        assert!(info.sync_error.is_none());

        let sync = info.sync.unwrap();
        assert_eq!(sync.time_offset, 0.0);
        assert_eq!(sync.duration_secs, Some(2.0));

        let report = session.run_expert_scan().unwrap();
        assert_eq!(report.residuals.night_l90, 40.0);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].duration(), 19.0 * 60.0);
        assert_eq!(session.last_scan(), Some(&report));

        let stages: Vec<String> = sink.entries().into_iter().map(|e| e.stage).collect();
        assert!(stages.contains(&"load".to_string()));
        assert!(stages.contains(&"sync".to_string()));
        assert!(stages.contains(&"emergence_scan".to_string()));
    }

    #[test]
    fn test_missing_audio_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        write_project(&project, false);

        let mut session = Session::new(config(&temp_dir));
        let info = session.load_project(&project).unwrap();

        assert!(info.sync.is_none());
        assert!(info.sync_error.unwrap().contains("not found"));
        assert!(session.playback_target(START).is_err());
        assert_eq!(session.run_expert_scan().unwrap().events.len(), 1);
    }

    #[test]
    fn test_playback_target_clamped_to_audio() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        write_project(&project, true);

        let mut session = Session::new(config(&temp_dir));
        session.load_project(&project).unwrap();

        let target = session.playback_target(START).unwrap();
        assert_eq!(target.position_ms, 0);
        assert!(target.path.ends_with("2025-12-19_22h00_Audio.wav"));

        // two-second file
        let target = session.playback_target(START + 600.0).unwrap();
        assert_eq!(target.position_ms, 2000);
    }

    #[test]
    fn test_zones_are_saved_to_working_copy() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        write_project(&project, true);

        let mut session = Session::new(config(&temp_dir));
        session.load_project(&project).unwrap();

        let marker = session
            .annotate_zone(START + 3600.0, START + 4740.0, "Source + (PAC)")
            .unwrap();
        assert_eq!(marker.duration_secs, 1140.0);
        session.relabel_marker(marker.ts, "Source Std").unwrap();

        let original = fs::read_to_string(project.join("survey.csv")).unwrap();
        assert!(!original.contains("Source"));

        let mut reopened = Session::new(config(&temp_dir));
        let info = reopened.load_project(&project).unwrap();
        assert!(!info.created_working_copy);
        assert_eq!(info.marker_count, 1);
        assert_eq!(reopened.markers()[0].label, "Source Std");

        reopened.delete_marker(marker.ts).unwrap();
        assert!(reopened.markers().is_empty());
    }

    #[test]
    fn test_learn_and_predict_from_timeline() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        write_project(&project, true);

        let mut session = Session::new(config(&temp_dir));
        session.open_knowledge().unwrap();
        session.load_project(&project).unwrap();

        assert!(session.predict(&spectrum(60.0, 20.0)).is_err());

        session.learn_at(START + 4000.0, "Source + (PAC)").unwrap();
        session.learn_at(START, "Résiduel (Calme)").unwrap();

        assert_eq!(session.predict(&spectrum(59.0, 21.0)).unwrap().label, "Source + (PAC)");
        assert_eq!(session.predict(&spectrum(36.0, 20.0)).unwrap().label, "Résiduel (Calme)");

        let analysis = session.analyze_at(START + 4000.0).unwrap();
        assert_eq!(analysis.prediction.unwrap().label, "Source + (PAC)");

        // persisted in the configured knowledge file
        let stored = fs::read_to_string(temp_dir.path().join("knowledge.csv")).unwrap();
        assert_eq!(stored.lines().count(), 2);
    }

    #[test]
    fn test_learn_at_without_band_columns_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        fs::write(
            project.join("survey.csv"),
            format!("ts;dBA\n{};40,0\n{};41,0\n", START as i64, START as i64 + 60),
        )
        .unwrap();

        let mut session = Session::new(config(&temp_dir));
        session.open_knowledge().unwrap();
        session.load_project(&project).unwrap();

        let err = session.learn_at(START, "Source Std").unwrap_err();
        assert!(err.message().starts_with("Malformed example"));
        assert!(!session.classifier().is_trained());
        assert!(!temp_dir.path().join("knowledge.csv").exists());

        assert!(session.analyze_at(START + 90.0).is_err());
    }

    #[test]
    fn test_detached_series_window_and_empty_cases() {
        let mut session = Session::new(AnalysisConfig::default());

        assert!(session.query_window(0.0).is_empty());
        assert!(session.resolve_sync(Some("2025-12-19_22h00_Audio.wav")).is_err());
        assert!(session.learn_at(0.0, "A").is_err());

        let samples = (0..10)
            .map(|i| Sample::new(i as f64, Some(40.0)).with_bands(vec![i as f64]))
            .collect();
        session.attach_series(MeasurementSeries::new(vec!["50Hz".to_string()], samples).unwrap());

        let window = session.query_window(9.0);
        assert_eq!(window.sample_count, 6);
        assert_eq!(window.instant, vec![9.0]);
        assert_eq!(window.mean, vec![6.5]);
        assert_eq!(window.peak, vec![9.0]);
    }

    #[tokio::test]
    async fn test_scan_detached_matches_blocking_scan() {
        let timestamps: Vec<f64> = (0..120).map(|i| START + i as f64 * 60.0).collect();
        let levels: Vec<Option<f64>> = (0..120).map(|i| Some(if i < 80 { 40.0 } else { 56.0 })).collect();

        let mut config = AnalysisConfig::default();
        config.utc_offset_minutes = Some(60);
        let mut session = Session::new(config);
        session.attach_series(MeasurementSeries::from_levels(timestamps, levels).unwrap());

        let detached = session.scan_detached().await.unwrap();
        let blocking = session.run_expert_scan().unwrap();

        assert_eq!(detached, blocking);
        assert_eq!(detached.events.len(), 1);
    }

    #[test]
    fn test_analyze_project() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir(&project).unwrap();
        write_project(&project, true);

        let mut session = Session::new(config(&temp_dir));
        let report = analyze_project(&mut session, &project).unwrap();

        assert_eq!(report.knowledge, StoreReport::default());
        assert_eq!(report.scan.events.len(), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["project"]["sample_count"], 80);
    }
}
