//! Asynchronous upload executor.
//!
//! `submit` appends one pending record per planned unit, in plan order, before any unit
//! starts; units then run concurrently on the tokio runtime, bounded by a shared
//! semaphore, and finalize their own record. Completion order never affects record order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use uuid::Uuid;

use ingest_kernel::{
    normalize, DatatypeRegistry, HistoryId, JobId, PartPayload, PlannedUnit, RecordId, Resolver,
    UploadError, UploadPlan, UploadPlanner, UploadRequest,
};

use super::config::ExecutorConfig;
use super::fetcher::{ContentFetcher, HttpContentFetcher};
use super::models::{
    BatchStatus, JobHandle, JobSnapshot, OutputRecord, RecordOutcome, RecordState, UnitStatus,
};
use super::observability::BatchSummary;
use super::repository::OutputRepository;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct JobState {
    job_id: JobId,
    history_id: HistoryId,
    record_ids: Vec<RecordId>,
    /// Unit statuses by position.
    units: RwLock<Vec<UnitStatus>>,
    submitted_at: DateTime<Utc>,
}

impl JobState {
    fn transition(&self, position: usize, next: UnitStatus) -> Result<(), UploadError> {
        let mut units = self
            .units
            .write()
            .map_err(|e| UploadError::Runtime(e.to_string()))?;
        let current = units.get_mut(position).ok_or_else(|| {
            UploadError::Runtime(format!("job {} has no unit {}", self.job_id, position))
        })?;
        *current = current.transition(next)?;
        Ok(())
    }

    fn units(&self) -> Result<Vec<UnitStatus>, UploadError> {
        self.units
            .read()
            .map(|units| units.clone())
            .map_err(|e| UploadError::Runtime(e.to_string()))
    }

    fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: self.job_id.clone(),
            history_id: self.history_id.clone(),
            record_ids: self.record_ids.clone(),
        }
    }
}

struct FinishedUnit {
    content: Vec<u8>,
    parts: BTreeMap<String, Vec<u8>>,
    file_ext: String,
    genome_build: String,
}

/// One planned unit bound to its pending record.
struct UnitTask<R> {
    repository: Arc<R>,
    datatypes: Arc<DatatypeRegistry>,
    fetcher: Arc<dyn ContentFetcher>,
    permits: Arc<Semaphore>,
    config: ExecutorConfig,
    job: Arc<JobState>,
    record_id: RecordId,
    unit: PlannedUnit,
}

impl<R: OutputRepository + 'static> UnitTask<R> {
    async fn run(self) {
        let position = self.unit.position;
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| UploadError::Runtime(e.to_string()));
        if let Err(err) = self.job.transition(position, UnitStatus::Running) {
            log::warn!(
                "upload_unit_skipped job_id={} position={} error={}",
                self.job.job_id,
                position,
                err
            );
            return;
        }

        let result = match permit {
            Ok(_permit) => self.execute().await,
            Err(err) => Err(err),
        };
        let outcome = match result {
            Ok(finished) => RecordOutcome::Ok {
                content: finished.content,
                parts: finished.parts,
                file_ext: finished.file_ext,
                genome_build: finished.genome_build,
            },
            Err(err) => RecordOutcome::Failed {
                reason: err.to_string(),
            },
        };
        let status = match self
            .repository
            .finalize(&self.job.history_id, &self.record_id, outcome)
        {
            Ok(record) if record.state == RecordState::Ok => UnitStatus::Ok,
            Ok(record) => UnitStatus::Failed {
                reason: record.failure.unwrap_or_default(),
            },
            Err(err) => UnitStatus::Failed {
                reason: err.to_string(),
            },
        };

        match &status {
            UnitStatus::Failed { reason } => log::warn!(
                "upload_unit_failed job_id={} position={} record_id={} reason={}",
                self.job.job_id,
                position,
                self.record_id,
                reason
            ),
            _ => log::info!(
                "upload_unit_ok job_id={} position={} record_id={}",
                self.job.job_id,
                position,
                self.record_id
            ),
        }
        if let Err(err) = self.job.transition(position, status) {
            log::warn!(
                "upload_unit_transition_failed job_id={} position={} error={}",
                self.job.job_id,
                position,
                err
            );
        }
    }

    async fn execute(&self) -> Result<FinishedUnit, UploadError> {
        let mut contents: Vec<(Option<String>, Vec<u8>)> = Vec::new();
        for part in self.unit.parts() {
            let bytes = match &part.payload {
                PartPayload::Ready(bytes) => bytes.clone(),
                PartPayload::Remote { url } => normalize(&self.fetch(url).await?, part.options),
            };
            contents.push((part.part_name.clone(), bytes));
        }

        let resolver = Resolver::new(&self.datatypes);
        let genome_build = Some(self.unit.genome_build.as_str());
        if self.unit.is_composite() {
            let names: Vec<&str> = contents
                .iter()
                .filter_map(|(name, _)| name.as_deref())
                .collect();
            let resolution =
                resolver.resolve_composite(&self.unit.file_type, &names, genome_build)?;
            let manifest: String = names.iter().map(|name| format!("{}\n", name)).collect();
            let parts = contents
                .into_iter()
                .filter_map(|(name, bytes)| name.map(|name| (name, bytes)))
                .collect();
            return Ok(FinishedUnit {
                content: manifest.into_bytes(),
                parts,
                file_ext: resolution.file_ext,
                genome_build: resolution.genome_build,
            });
        }

        let (_, content) = contents
            .into_iter()
            .next()
            .ok_or_else(|| UploadError::Runtime("planned unit has no content".to_string()))?;
        let resolution = resolver.resolve(&content, Some(&self.unit.file_type), genome_build)?;
        Ok(FinishedUnit {
            content,
            parts: BTreeMap::new(),
            file_ext: resolution.file_ext,
            genome_build: resolution.genome_build,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, UploadError> {
        let bytes = tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| {
                UploadError::Fetch(format!(
                    "fetching {} timed out after {}ms",
                    url,
                    self.config.fetch_timeout.as_millis()
                ))
            })??;
        if bytes.len() > self.config.max_upload_bytes {
            return Err(UploadError::Fetch(format!(
                "{} exceeds the {} byte upload limit",
                url, self.config.max_upload_bytes
            )));
        }
        Ok(bytes)
    }
}

/// Runs upload plans against an [OutputRepository].
pub struct UploadExecutor<R> {
    repository: Arc<R>,
    datatypes: Arc<DatatypeRegistry>,
    fetcher: Arc<dyn ContentFetcher>,
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
    jobs: RwLock<HashMap<JobId, Arc<JobState>>>,
    runtime: Handle,
}

impl<R: OutputRepository + 'static> UploadExecutor<R> {
    /// Binds the executor to the current tokio runtime.
    pub fn new(
        repository: Arc<R>,
        datatypes: Arc<DatatypeRegistry>,
        config: ExecutorConfig,
    ) -> Result<Self, UploadError> {
        let runtime = Handle::try_current().map_err(|e| {
            UploadError::Runtime(format!("upload executor needs a tokio runtime: {}", e))
        })?;
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(HttpContentFetcher::from_config(&config)?);
        Ok(Self {
            repository,
            datatypes,
            fetcher,
            permits: Arc::new(Semaphore::new(config.max_concurrent_units.max(1))),
            config,
            jobs: RwLock::new(HashMap::new()),
            runtime,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn datatypes(&self) -> &Arc<DatatypeRegistry> {
        &self.datatypes
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn planner(&self) -> UploadPlanner {
        UploadPlanner::new(Arc::clone(&self.datatypes))
    }

    /// Plans and submits a request in one step.
    pub fn upload(&self, request: &UploadRequest) -> Result<JobHandle, UploadError> {
        let plan = self.planner().plan(request)?;
        self.submit(plan)
    }

    /// Appends pending records for every unit, then schedules the units. Returns without
    /// waiting for any unit to run.
    pub fn submit(&self, plan: UploadPlan) -> Result<JobHandle, UploadError> {
        if !self.repository.has_history(&plan.history_id)? {
            return Err(UploadError::HistoryNotFound(plan.history_id));
        }
        let job_id = Uuid::new_v4().to_string();
        let records = plan
            .units
            .iter()
            .map(|unit| {
                OutputRecord::pending(&unit.name, &unit.file_type, &unit.genome_build)
                    .with_job(job_id.clone())
            })
            .collect();
        let record_ids = self.repository.append_all(&plan.history_id, records)?;

        let job = Arc::new(JobState {
            job_id: job_id.clone(),
            history_id: plan.history_id.clone(),
            record_ids: record_ids.clone(),
            units: RwLock::new(vec![UnitStatus::Pending; plan.units.len()]),
            submitted_at: Utc::now(),
        });
        {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|e| UploadError::Runtime(e.to_string()))?;
            jobs.insert(job_id.clone(), Arc::clone(&job));
        }
        log::info!(
            "upload_submit job_id={} history_id={} units={}",
            job_id,
            plan.history_id,
            plan.units.len()
        );

        for (unit, record_id) in plan.units.into_iter().zip(record_ids) {
            let task = UnitTask {
                repository: Arc::clone(&self.repository),
                datatypes: Arc::clone(&self.datatypes),
                fetcher: Arc::clone(&self.fetcher),
                permits: Arc::clone(&self.permits),
                config: self.config.clone(),
                job: Arc::clone(&job),
                record_id,
                unit,
            };
            self.runtime.spawn(task.run());
        }
        Ok(job.handle())
    }

    /// Drops a history from the repository and forgets every job submitted into it.
    /// Units still in flight finish against the missing history and fail quietly.
    pub fn drop_history(&self, history_id: &str) -> Result<(), UploadError> {
        self.repository.drop_history(history_id)?;
        let mut jobs = self
            .jobs
            .write()
            .map_err(|e| UploadError::Runtime(e.to_string()))?;
        let before = jobs.len();
        jobs.retain(|_, job| job.history_id != history_id);
        log::info!(
            "upload_jobs_evicted history_id={} jobs={}",
            history_id,
            before - jobs.len()
        );
        Ok(())
    }

    fn job(&self, job_id: &str) -> Result<Arc<JobState>, UploadError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| UploadError::Runtime(e.to_string()))?;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| UploadError::JobNotFound(job_id.to_string()))
    }

    pub fn unit_statuses(&self, job_id: &str) -> Result<Vec<UnitStatus>, UploadError> {
        self.job(job_id)?.units()
    }

    pub fn poll(&self, job_id: &str) -> Result<BatchStatus, UploadError> {
        Ok(BatchStatus::from_units(&self.unit_statuses(job_id)?))
    }

    pub fn summary(&self, job_id: &str) -> Result<BatchSummary, UploadError> {
        Ok(BatchSummary::from_units(&self.unit_statuses(job_id)?))
    }

    pub fn snapshot(&self, job_id: &str) -> Result<JobSnapshot, UploadError> {
        let job = self.job(job_id)?;
        let units = job.units()?;
        Ok(JobSnapshot {
            job_id: job.job_id.clone(),
            history_id: job.history_id.clone(),
            record_ids: job.record_ids.clone(),
            status: BatchStatus::from_units(&units),
            units,
            submitted_at: job.submitted_at,
        })
    }

    /// Polls until the batch is terminal or `timeout` elapses.
    pub async fn wait(&self, job_id: &str, timeout: Duration) -> Result<BatchStatus, UploadError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.poll(job_id)?;
            if status.is_terminal() {
                log::debug!(
                    "upload_job_done job_id={} {}",
                    job_id,
                    self.summary(job_id)?
                );
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(UploadError::Runtime(format!(
                    "job {} still {} after {}ms",
                    job_id,
                    status.label(),
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
