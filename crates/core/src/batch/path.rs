//! Batch path parsing and grouping.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info};

use super::{BatchPathError, Interval, TASK_MARKER_PREFIX};

/// Number of date components between the aggregation ID and the batch ID.
const DATE_COMPONENTS: usize = 5;

/// One logical batch, reconstructed from the objects that share its key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPath {
    pub aggregation_id: String,
    /// Year, month, day, hour and minute exactly as they appear in the key.
    pub date_components: Vec<String>,
    pub id: String,
    pub time: DateTime<Utc>,
    pub has_header: bool,
    pub has_payload: bool,
    pub has_signature: bool,
}

impl BatchPath {
    /// Parse a batch base name (`{aggregation_id}/{Y}/{M}/{D}/{H}/{m}/{batch_id}`).
    pub fn parse(key: &str) -> Result<Self, BatchPathError> {
        let components: Vec<&str> = key.split('/').collect();
        if components.len() != DATE_COMPONENTS + 2 {
            return Err(BatchPathError::MalformedDate {
                key: key.to_string(),
                found: components.len().saturating_sub(2),
            });
        }

        let aggregation_id = components[0].to_string();
        let id = components[components.len() - 1].to_string();
        let date_components: Vec<String> = components[1..components.len() - 1]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let mut numbers = [0u32; DATE_COMPONENTS];
        for (slot, component) in numbers.iter_mut().zip(&date_components) {
            *slot = component
                .parse()
                .map_err(|_| BatchPathError::NonNumericComponent {
                    key: key.to_string(),
                    component: component.clone(),
                })?;
        }

        let [year, month, day, hour, minute] = numbers;
        let time = Utc
            .with_ymd_and_hms(year as i32, month, day, hour, minute, 0)
            .single()
            .ok_or_else(|| BatchPathError::InvalidDate {
                key: key.to_string(),
            })?;

        Ok(Self {
            aggregation_id,
            date_components,
            id,
            time,
            has_header: false,
            has_payload: false,
            has_signature: false,
        })
    }

    /// A batch is complete once header, payload and signature all exist.
    pub fn is_complete(&self) -> bool {
        self.has_header && self.has_payload && self.has_signature
    }

    /// The `{Y}/{M}/{D}/{H}/{m}` portion of the key.
    pub fn date_path(&self) -> String {
        self.date_components.join("/")
    }

    /// The base key shared by the batch's objects.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.aggregation_id, self.date_path(), self.id)
    }
}

impl fmt::Display for BatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Which of the three batch objects a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchObject {
    Header,
    Payload,
    Signature,
}

/// Split a key into its batch base name and object role, or `None` if the
/// key does not belong to the `infix` family.
fn classify<'a>(key: &'a str, infix: &str) -> Option<(&'a str, BatchObject)> {
    let header = format!(".{}", infix);
    let payload = format!(".{}.avro", infix);
    let signature = format!(".{}.sig", infix);

    if let Some(base) = key.strip_suffix(&payload) {
        Some((base, BatchObject::Payload))
    } else if let Some(base) = key.strip_suffix(&signature) {
        Some((base, BatchObject::Signature))
    } else {
        key.strip_suffix(&header)
            .map(|base| (base, BatchObject::Header))
    }
}

/// Group a flat key listing into the complete batches of the `infix` family.
///
/// Keys under the task marker prefix and keys of other families are ignored.
/// Incomplete batches are logged and dropped. A key whose base name does not
/// parse fails the whole call. The result is sorted by batch time.
pub fn group_into_batches<S: AsRef<str>>(
    keys: &[S],
    infix: &str,
) -> Result<Vec<BatchPath>, BatchPathError> {
    let mut batches: HashMap<String, BatchPath> = HashMap::new();

    for key in keys {
        let key = key.as_ref();
        if key.starts_with(TASK_MARKER_PREFIX) {
            continue;
        }

        let Some((base, object)) = classify(key, infix) else {
            debug!(key = key, infix = infix, "Ignoring key outside batch family");
            continue;
        };

        let batch = match batches.entry(base.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(BatchPath::parse(base)?),
        };

        match object {
            BatchObject::Header => batch.has_header = true,
            BatchObject::Payload => batch.has_payload = true,
            BatchObject::Signature => batch.has_signature = true,
        }
    }

    let mut ready = Vec::with_capacity(batches.len());
    for batch in batches.into_values() {
        if batch.is_complete() {
            ready.push(batch);
        } else {
            info!(
                batch = %batch,
                has_header = batch.has_header,
                has_payload = batch.has_payload,
                has_signature = batch.has_signature,
                "Ignoring incomplete batch"
            );
        }
    }

    ready.sort_by(|a, b| a.time.cmp(&b.time));
    Ok(ready)
}

/// Base keys of the batches whose time falls inside `interval`.
pub fn filter_within_interval(batches: &[BatchPath], interval: &Interval) -> Vec<String> {
    batches
        .iter()
        .filter(|batch| interval.includes(batch.time))
        .map(BatchPath::path)
        .collect()
}
