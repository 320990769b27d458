//! Upload pipeline shared by the station and waveform mappers
//!
//! 1. obtain the payload (request body, or a file on the server to index)
//! 2. reject known checksums
//! 3. parse
//! 4. write the file under a name derived from its content
//! 5. insert all rows in one transaction
//!
//! If step 5 fails the transaction is dropped (rolled back) and a file
//! written in step 4 is removed again.

use crate::db::{events, filepaths, metadata, stations, waveforms};
use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::formats::{self, ChannelInfo, Trace};
use chrono::{Datelike, Timelike};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

const ROLLBACK_SUFFIX: &str = " - Rolling back all changes.";
const PLACEHOLDER_CODE: &str = "XX";

/// Raw upload bytes and where they came from
#[derive(Debug)]
pub struct Payload {
    pub data: Vec<u8>,
    /// `Some` for files indexed in place
    pub indexed_path: Option<PathBuf>,
}

/// Use the request body, or read the file named by `index_file`
pub async fn obtain_payload(body: Vec<u8>, index_file: Option<&str>) -> ApiResult<Payload> {
    let Some(index_file) = index_file else {
        return Ok(Payload { data: body, indexed_path: None });
    };

    let path = absolute_path(Path::new(index_file))?;
    let is_file = tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false);
    if !is_file {
        return Err(ApiError::BadRequest(format!(
            "File '{}' cannot be found by the server.",
            path.display()
        )));
    }

    let data = tokio::fs::read(&path).await?;
    debug!(path = %path.display(), bytes = data.len(), "Indexing file in place");
    Ok(Payload { data, indexed_path: Some(path) })
}

fn absolute_path(path: &Path) -> ApiResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Checksum of a payload not yet in the database
pub async fn ensure_new_checksum(pool: &SqlitePool, data: &[u8]) -> ApiResult<String> {
    let checksum = filepaths::calculate_checksum(data);
    if filepaths::checksum_exists(pool, &checksum).await? {
        return Err(ApiError::Duplicate("This file already exists in the database.".to_string()));
    }
    Ok(checksum)
}

/// Whether `name` can be used as a single path component
pub fn is_path_safe(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}

/// Code as used in a file name; empty or path-unsafe codes become `XX`
fn code_or_placeholder(code: &str) -> &str {
    if is_path_safe(code) {
        code
    } else {
        PLACEHOLDER_CODE
    }
}

/// Location codes may be empty
fn location_code(code: &str) -> &str {
    if code.is_empty() {
        code
    } else {
        code_or_placeholder(code)
    }
}

/// `{root}/{NET}/{NET}.{STA}.{LOC}.{CHA}-{year}_{month}`
pub fn station_filename(root: &Path, channel: &ChannelInfo) -> PathBuf {
    let network = code_or_placeholder(&channel.network);
    root.join(network).join(format!(
        "{}.{}.{}.{}-{}_{}",
        network,
        code_or_placeholder(&channel.station),
        location_code(&channel.location),
        code_or_placeholder(&channel.channel),
        channel.start_date.year(),
        channel.start_date.month()
    ))
}

/// `{root}/{event}/{NET}.{STA}.{LOC}.{CHA}-{year}_{month}_{day}_{hour}`
pub fn waveform_filename(root: &Path, event: &str, trace: &Trace) -> PathBuf {
    let start = trace.stats.starttime;
    root.join(code_or_placeholder(event)).join(format!(
        "{}.{}.{}.{}-{}_{}_{}_{}",
        code_or_placeholder(&trace.stats.network),
        code_or_placeholder(&trace.stats.station),
        location_code(&trace.stats.location),
        code_or_placeholder(&trace.stats.channel),
        start.year(),
        start.month(),
        start.day(),
        start.hour()
    ))
}

/// `target` lies below `root` without climbing out of it
fn is_below(root: &Path, target: &Path) -> bool {
    target
        .strip_prefix(root)
        .map(|rest| {
            rest.components().next().is_some() && rest.components().all(|c| matches!(c, Component::Normal(_)))
        })
        .unwrap_or(false)
}

/// Write `data` to `target`, or to `target.1`, `target.2`, ... if taken
///
/// Returns the path actually written. Creation uses create-new semantics, so
/// concurrent writers never share a file.
pub async fn write_unique(target: &Path, data: &[u8]) -> std::io::Result<PathBuf> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut suffix = 0u32;
    loop {
        let candidate = if suffix == 0 {
            target.to_path_buf()
        } else {
            let mut name = target.as_os_str().to_os_string();
            name.push(format!(".{}", suffix));
            PathBuf::from(name)
        };

        match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(mut file) => {
                file.write_all(data).await?;
                file.flush().await?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Location of the payload on disk
#[derive(Debug)]
struct StoredFile {
    path: PathBuf,
    managed: bool,
}

impl StoredFile {
    async fn store(payload: &Payload, root: &Path, target: impl FnOnce() -> PathBuf) -> ApiResult<Self> {
        match &payload.indexed_path {
            Some(path) => Ok(Self { path: path.clone(), managed: false }),
            None => {
                let target = target();
                if !is_below(root, &target) {
                    warn!(root = %root.display(), target = %target.display(), "Refusing to write outside the storage root");
                    return Err(ApiError::BadRequest("Invalid file name derived from the upload.".to_string()));
                }
                let path = write_unique(&target, &payload.data).await?;
                Ok(Self { path, managed: true })
            }
        }
    }

    /// Remove a file this upload wrote; indexed files are left alone
    async fn discard(&self) {
        if !self.managed {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!(path = %self.path.display(), "Removed file of failed upload"),
            Err(e) => error!(path = %self.path.display(), "Failed to remove file of failed upload: {}", e),
        }
    }
}

/// Map a failed transaction to the response error
fn rolled_back(err: ebd_common::Error) -> ApiError {
    let message = format!("{}{}", err, ROLLBACK_SUFFIX);
    match &err {
        ebd_common::Error::Database(db) if is_unique_violation(db) => ApiError::Duplicate(message),
        _ => ApiError::Internal(message),
    }
}

/// Result of a station information upload
#[derive(Debug, Serialize)]
pub struct StationUpload {
    pub filepath_id: i64,
    pub filepath: PathBuf,
    pub channels: Vec<ChannelInfo>,
}

/// Store a SEED, XSEED or RESP file and index its channel epochs
pub async fn ingest_station_information(
    pool: &SqlitePool,
    station_root: &Path,
    payload: Payload,
) -> ApiResult<StationUpload> {
    let checksum = ensure_new_checksum(pool, &payload.data).await?;

    let channels = formats::read_station_information(&payload.data)?;
    let Some(first) = channels.first() else {
        return Err(ApiError::InvalidObject("Could not read the station information file.".to_string()));
    };
    let stored = StoredFile::store(&payload, station_root, || station_filename(station_root, first)).await?;

    let size = payload.data.len() as i64;
    let result: ebd_common::Result<i64> = async {
        let mut tx = pool.begin().await?;
        let filepath_id = filepaths::insert_filepath(&mut tx, &stored.path, size, &checksum, stored.managed).await?;
        for c in &channels {
            let channel_id =
                stations::add_or_update_channel(&mut tx, &c.network, &c.station, &c.location, &c.channel, c.coordinates)
                    .await?;
            metadata::insert_channel_metadata(
                &mut tx,
                channel_id,
                filepath_id,
                &c.start_date,
                c.end_date.as_ref(),
                c.format.as_str(),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(filepath_id)
    }
    .await;

    match result {
        Ok(filepath_id) => {
            info!(
                checksum = %checksum,
                path = %stored.path.display(),
                managed = stored.managed,
                channels = channels.len(),
                "Stored station information"
            );
            Ok(StationUpload { filepath_id, filepath: stored.path, channels })
        }
        Err(e) => {
            warn!(path = %stored.path.display(), "Station upload failed: {}", e);
            stored.discard().await;
            Err(rolled_back(e))
        }
    }
}

/// Event binding and labels of a waveform upload
#[derive(Debug, Clone)]
pub struct WaveformUploadOptions {
    pub event: String,
    pub tag: String,
    pub is_synthetic: bool,
}

#[derive(Debug, Serialize)]
pub struct WaveformUpload {
    pub filepath_id: i64,
    pub filepath: PathBuf,
    pub event: String,
    pub tag: String,
    pub format: &'static str,
    pub channels: Vec<String>,
}

/// Store a MiniSEED or SAC file bound to an existing event
///
/// The event is checked before the payload is even looked at.
pub async fn ingest_waveform(
    pool: &SqlitePool,
    waveform_root: &Path,
    body: Vec<u8>,
    index_file: Option<&str>,
    options: &WaveformUploadOptions,
) -> ApiResult<WaveformUpload> {
    let event_id = events::get_event_id(pool, &options.event).await?.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "The given event resource name '{}' is not known to the server.",
            options.event
        ))
    })?;

    let payload = obtain_payload(body, index_file).await?;
    let checksum = ensure_new_checksum(pool, &payload.data).await?;

    let waveform = formats::read_waveform(&payload.data).map_err(|e| {
        debug!("Waveform parsing failed: {}", e);
        ApiError::InvalidObject(format!(
            "The data does not appear to be a valid waveform file: {}",
            e
        ))
    })?;
    let Some(first) = waveform.traces.first() else {
        return Err(ApiError::InvalidObject("The waveform file contains no traces.".to_string()));
    };

    // Tags are unique per channel and event
    let channel_ids: BTreeSet<(String, String, String, String)> = waveform
        .traces
        .iter()
        .map(|t| {
            (
                t.stats.network.clone(),
                t.stats.station.clone(),
                t.stats.location.clone(),
                t.stats.channel.clone(),
            )
        })
        .collect();
    for (network, station, location, channel) in &channel_ids {
        let tags = waveforms::get_all_tags(pool, network, station, location, channel, event_id).await?;
        if tags.iter().any(|t| t == &options.tag) {
            return Err(ApiError::BadRequest(
                "Tag already exists for the given channel id and event.".to_string(),
            ));
        }
    }

    let stored =
        StoredFile::store(&payload, waveform_root, || waveform_filename(waveform_root, &options.event, first)).await?;

    let size = payload.data.len() as i64;
    let format = waveform.format.as_str();
    let result: ebd_common::Result<i64> = async {
        let mut tx = pool.begin().await?;
        let filepath_id = filepaths::insert_filepath(&mut tx, &stored.path, size, &checksum, stored.managed).await?;
        for trace in &waveform.traces {
            let s = &trace.stats;
            let channel_id =
                stations::add_or_update_channel(&mut tx, &s.network, &s.station, &s.location, &s.channel, s.coordinates)
                    .await?;
            let row = waveforms::NewWaveformChannel {
                channel_id,
                filepath_id,
                event_id,
                starttime: s.starttime,
                endtime: trace.endtime(),
                sampling_rate: s.sampling_rate,
                format,
                is_synthetic: options.is_synthetic,
                tag: &options.tag,
            };
            waveforms::insert_waveform_channel(&mut tx, &row).await?;
        }
        tx.commit().await?;
        Ok(filepath_id)
    }
    .await;

    match result {
        Ok(filepath_id) => {
            info!(
                checksum = %checksum,
                path = %stored.path.display(),
                event = %options.event,
                traces = waveform.traces.len(),
                "Stored waveform"
            );
            Ok(WaveformUpload {
                filepath_id,
                filepath: stored.path,
                event: options.event.clone(),
                tag: options.tag.clone(),
                format,
                channels: waveform.traces.iter().map(Trace::id).collect(),
            })
        }
        Err(e) => {
            warn!(path = %stored.path.display(), "Waveform upload failed: {}", e);
            stored.discard().await;
            Err(rolled_back(e))
        }
    }
}
