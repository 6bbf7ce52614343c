//! Persists evaluated series as new space-time datasets.
//!
//! Registration names the result maps, copies their payloads through the
//! [`MapStore`], and writes all catalog rows in one transaction under the
//! dataset's writer lock. Replacing a dataset happens inside the same
//! transaction, after its maps have been read. A failed registration rolls
//! the catalog back, deletes the maps it wrote and restores the payloads it
//! replaced.

use crate::algebra::{ExecutionReport, Series, summarize};
use crate::catalog::{Catalog, Dataset, MapRecord};
use crate::config::{Config, SuffixMode};
use crate::error::{AlgebraError, CatalogError, Result};
use crate::kernel::MapStore;
use crate::temporal::{
    Granularity, TemporalExtent, TemporalType, TimeIncrement, TimeUnit, compute_granularity,
};
use crate::types::{DatasetId, MapId, MapKind, StdsKind};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

/// The dataset a result is registered as.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub kind: MapKind,
    pub name: String,
    pub temporal_type: TemporalType,
    pub semantic_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedMap {
    pub id: MapId,
    pub extent: TemporalExtent,
    pub operand: String,
}

/// What a registration would write, computed without side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationPlan {
    pub dataset: DatasetId,
    pub kind: StdsKind,
    pub temporal_type: TemporalType,
    pub semantic_type: String,
    /// True when the dataset exists and would be replaced
    pub replaces_existing: bool,
    pub maps: Vec<PlannedMap>,
    pub extent: Option<TemporalExtent>,
    pub granularity: Option<Granularity>,
    pub topology_ok: bool,
}

impl RegistrationPlan {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Store writes of one registration.
#[derive(Debug, Default)]
struct StoreJournal {
    /// Scratch copies of sources a final write could replace
    staged: Vec<MapId>,
    /// Replaced payloads as `(map, backup)`
    backups: Vec<(MapId, MapId)>,
    /// Final maps that did not exist before
    written: Vec<MapId>,
}

pub struct Registrar<'a> {
    catalog: &'a Catalog,
    store: &'a dyn MapStore,
    config: &'a Config,
}

impl<'a> Registrar<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a dyn MapStore, config: &'a Config) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    fn dataset_id(&self, name: &str) -> DatasetId {
        DatasetId::new(name, self.config.mapset.as_str())
    }

    /// Describe the registration of `series` without writing anything.
    pub fn plan(&self, target: &Target, series: &Series) -> Result<RegistrationPlan> {
        let stds = target.kind.dataset_kind();
        let dataset = self.dataset_id(&target.name);
        let extents = series.extents();
        let names = map_names(&target.name, &extents, self.config.suffix);
        let topology = summarize(&extents);
        let maps = series
            .iter()
            .zip(names)
            .map(|(entry, name)| PlannedMap {
                id: MapId::new(name, self.config.mapset.as_str()),
                extent: entry.extent,
                operand: entry.operand.to_string(),
            })
            .collect();
        Ok(RegistrationPlan {
            replaces_existing: self.catalog.dataset_exists(stds, &dataset)?,
            dataset,
            kind: stds,
            temporal_type: target.temporal_type,
            semantic_type: target.semantic_type.clone(),
            maps,
            extent: topology.extent,
            granularity: topology.granularity,
            topology_ok: topology.topology_ok,
        })
    }

    /// Register the candidates of an execution as a new dataset. All
    /// temporaries of the report are deleted whether or not this succeeds.
    pub fn register(&self, target: &Target, report: &ExecutionReport) -> Result<Dataset> {
        let id = self.dataset_id(&target.name);
        let result = self
            .catalog
            .with_dataset_lock(&id, || self.register_locked(target, &id, report));
        self.delete_maps(&report.temporaries);
        result
    }

    fn register_locked(
        &self,
        target: &Target,
        id: &DatasetId,
        report: &ExecutionReport,
    ) -> Result<Dataset> {
        let previous = self.previous_members(target.kind.dataset_kind(), id)?;
        let extents: Vec<TemporalExtent> = report.candidates.iter().map(|c| c.extent).collect();
        let finals: Vec<MapId> = map_names(&target.name, &extents, self.config.suffix)
            .into_iter()
            .map(|name| MapId::new(name, self.config.mapset.as_str()))
            .collect();

        let mut journal = StoreJournal::default();
        let replaced = previous.as_deref().unwrap_or_default();
        let committed = self
            .write_maps(target, id, report, replaced, &finals, &mut journal)
            .and_then(|records| {
                self.commit(target, id, previous.is_some(), &records)?;
                Ok(records.len())
            });
        match committed {
            Ok(count) => {
                let obsolete: Vec<MapId> = previous
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|map| !finals.contains(map))
                    .collect();
                self.discard(&journal, &obsolete);
                log::info!("registered {id} with {count} maps");
                self.load(target.kind.dataset_kind(), id)
            }
            Err(err) => {
                log::warn!(
                    "registration of {id} failed, deleting {} maps and restoring {}",
                    journal.written.len(),
                    journal.backups.len()
                );
                self.undo(&journal);
                Err(err)
            }
        }
    }

    /// Members of the dataset a registration replaces, `None` when it does
    /// not exist yet. Refuses an existing dataset unless overwriting.
    fn previous_members(&self, stds: StdsKind, id: &DatasetId) -> Result<Option<Vec<MapId>>> {
        if !self.catalog.dataset_exists(stds, id)? {
            return Ok(None);
        }
        if !self.config.overwrite {
            return Err(CatalogError::AlreadyExists {
                kind: stds.to_string(),
                id: id.id(),
            }
            .into());
        }
        let members: Vec<MapId> = self
            .catalog
            .registered_maps(stds, id)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        log::info!("overwriting {id} with {} maps", members.len());
        Ok(Some(members))
    }

    /// Write the candidates under their final names and build their rows.
    ///
    /// Sources that a final write could replace are staged first, and
    /// replaced payloads are backed up, so `undo` can restore the store.
    fn write_maps(
        &self,
        target: &Target,
        id: &DatasetId,
        report: &ExecutionReport,
        previous: &[MapId],
        finals: &[MapId],
        journal: &mut StoreJournal,
    ) -> Result<Vec<MapRecord>> {
        let at_risk: FxHashSet<&MapId> = previous.iter().chain(finals).collect();
        let mut sources = Vec::with_capacity(finals.len());
        for candidate in &report.candidates {
            if at_risk.contains(&candidate.map) {
                let staged = self.scratch_id();
                self.store.copy(&candidate.map, &staged, false)?;
                journal.staged.push(staged.clone());
                sources.push(staged);
            } else {
                sources.push(candidate.map.clone());
            }
        }

        let mut records = Vec::with_capacity(finals.len());
        for ((candidate, source), map) in report.candidates.iter().zip(&sources).zip(finals) {
            let existed = self.store.exists(map);
            let backup = if existed && self.config.overwrite {
                let backup = self.scratch_id();
                self.store.copy(map, &backup, false)?;
                Some(backup)
            } else {
                None
            };
            if let Err(err) = self.store.copy(source, map, self.config.overwrite) {
                // a failed write leaves the previous payload in place
                if let Some(backup) = &backup {
                    self.delete_maps(std::slice::from_ref(backup));
                }
                return Err(err);
            }
            match backup {
                Some(backup) => journal.backups.push((map.clone(), backup)),
                None if !existed => journal.written.push(map.clone()),
                None => {}
            }
            let mut record = self.record_from_store(target.kind, map, candidate.extent)?;
            record.stds = Some(id.clone());
            records.push(record);
        }
        if records.is_empty() {
            log::warn!("{id} is registered without maps");
        }
        Ok(records)
    }

    /// Write all catalog rows of the new dataset in one transaction,
    /// removing the replaced dataset first.
    fn commit(
        &self,
        target: &Target,
        id: &DatasetId,
        replacing: bool,
        records: &[MapRecord],
    ) -> Result<()> {
        let stds = target.kind.dataset_kind();
        let creator = self.config.creator.as_str();
        self.catalog.transaction(|| -> Result<()> {
            if replacing {
                self.catalog.remove_dataset(stds, id, true)?;
            }
            self.catalog.open_new_dataset(
                stds,
                id,
                target.temporal_type,
                &target.semantic_type,
                creator,
            )?;
            for record in records {
                self.catalog.insert_map(record, creator)?;
                self.catalog.register_map(stds, id, &record.id)?;
            }
            self.catalog.update_dataset_metadata(stds, id)?;
            Ok(())
        })
    }

    fn scratch_id(&self) -> MapId {
        MapId::new(
            self.catalog.sequence().temporary_name(),
            self.config.mapset.as_str(),
        )
    }

    /// Put the store back the way it was before a failed registration.
    fn undo(&self, journal: &StoreJournal) {
        self.delete_maps(&journal.written);
        for (map, backup) in &journal.backups {
            match self.store.copy(backup, map, true) {
                Ok(()) => self.delete_maps(std::slice::from_ref(backup)),
                Err(err) => {
                    log::warn!("failed to restore {map}, its payload is kept as {backup}: {err}")
                }
            }
        }
        self.delete_maps(&journal.staged);
    }

    /// Drop the scratch copies of a successful registration together with
    /// replaced maps that were not written again.
    fn discard(&self, journal: &StoreJournal, obsolete: &[MapId]) {
        self.delete_maps(&journal.staged);
        for (_, backup) in &journal.backups {
            self.delete_maps(std::slice::from_ref(backup));
        }
        self.delete_maps(obsolete);
    }

    fn record_from_store(
        &self,
        kind: MapKind,
        map: &MapId,
        extent: TemporalExtent,
    ) -> Result<MapRecord> {
        let payload = self.store.read(map)?;
        let mut record = MapRecord::new(map.clone(), kind, extent).with_bounds(payload.bounds);
        record.min = payload.min;
        record.max = payload.max;
        Ok(record)
    }

    fn delete_maps(&self, maps: &[MapId]) {
        for map in maps {
            if let Err(err) = self.store.delete(map) {
                log::warn!("failed to delete map {map}: {err}");
            }
        }
    }

    fn load(&self, stds: StdsKind, id: &DatasetId) -> Result<Dataset> {
        self.catalog.dataset(stds, id)?.ok_or_else(|| {
            CatalogError::NotFound {
                kind: stds.to_string(),
                id: id.id(),
            }
            .into()
        })
    }

    /// Register stored maps into a dataset, creating it when missing.
    /// Map `i` gets `first` shifted by `i` increments.
    pub fn register_existing(
        &self,
        stds: StdsKind,
        name: &str,
        semantic_type: &str,
        maps: &[MapId],
        first: TemporalExtent,
        increment: &TimeIncrement,
    ) -> Result<Dataset> {
        let id = self.dataset_id(name);
        let kind = stds.map_kind();
        let mut records = Vec::with_capacity(maps.len());
        for (i, map) in maps.iter().enumerate() {
            let extent = first.shifted(&increment.scaled(i as i64))?;
            records.push(self.record_from_store(kind, map, extent)?);
        }
        if records
            .iter()
            .any(|r| r.extent.temporal_type() != first.temporal_type())
        {
            return Err(AlgebraError::InvalidExtent(
                "maps mix absolute and relative time".to_string(),
            ));
        }

        let creator = self.config.creator.as_str();
        self.catalog.with_dataset_lock(&id, || {
            self.catalog.transaction(|| -> Result<()> {
                if !self.catalog.dataset_exists(stds, &id)? {
                    self.catalog.open_new_dataset(
                        stds,
                        &id,
                        first.temporal_type(),
                        semantic_type,
                        creator,
                    )?;
                }
                for record in &records {
                    self.upsert_map(record, creator)?;
                    self.catalog.register_map(stds, &id, &record.id)?;
                }
                self.catalog.update_dataset_metadata(stds, &id)?;
                Ok(())
            })?;
            self.load(stds, &id)
        })
    }

    /// Record a stored map in the catalog without a dataset, for `tmap()`.
    pub fn register_free_map(
        &self,
        kind: MapKind,
        map: &MapId,
        extent: TemporalExtent,
    ) -> Result<MapRecord> {
        let record = self.record_from_store(kind, map, extent)?;
        self.upsert_map(&record, &self.config.creator)?;
        Ok(record)
    }

    fn upsert_map(&self, record: &MapRecord, creator: &str) -> Result<()> {
        if self.catalog.map_exists(record.kind, &record.id)? {
            self.catalog.update_map(record)?;
        } else {
            self.catalog.insert_map(record, creator)?;
        }
        Ok(())
    }
}

/// Result map names for a series of extents.
///
/// Repeated names (several maps sharing a start) get a running `_2`, `_3`
/// suffix.
pub fn map_names(basename: &str, extents: &[TemporalExtent], suffix: SuffixMode) -> Vec<String> {
    let width = extents.len().to_string().len();
    let unit = compute_granularity(extents).map(|g| g.unit);
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    extents
        .iter()
        .enumerate()
        .map(|(i, extent)| {
            let tail = match suffix {
                SuffixMode::Num => format!("{:0width$}", i + 1),
                SuffixMode::Time => start_suffix(extent, None),
                SuffixMode::Gran => start_suffix(extent, unit),
            };
            let name = format!("{basename}_{tail}");
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                format!("{name}_{count}")
            } else {
                name
            }
        })
        .collect()
}

/// Start time truncated to `unit`; the full timestamp without a unit.
fn start_suffix(extent: &TemporalExtent, unit: Option<TimeUnit>) -> String {
    let Some(start) = extent.start_datetime() else {
        return extent.bounds().0.to_string();
    };
    let format = match unit {
        Some(TimeUnit::Year) => "%Y",
        Some(TimeUnit::Month) => "%Y_%m",
        Some(TimeUnit::Week | TimeUnit::Day) => "%Y_%m_%d",
        Some(TimeUnit::Hour) => "%Y_%m_%d_%H",
        Some(TimeUnit::Minute) => "%Y_%m_%d_%H_%M",
        Some(TimeUnit::Second) | None => "%Y_%m_%d_%H_%M_%S",
    };
    start.format(format).to_string()
}
