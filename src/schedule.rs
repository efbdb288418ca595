//! Schedule records — normalized from raw pages.

use crate::config::{FlagKind, PropertyMap};
use crate::workspace::filter::Filter;
use crate::workspace::{PropertyValue, RawRecord, props};

/// Processing state carried by a schedule's flag property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagState {
    #[default]
    Unprocessed,
    Processed,
}

impl FlagKind {
    /// Decode the flag. Anything unreadable counts as unprocessed.
    pub fn read(&self, record: &RawRecord, property: &str) -> FlagState {
        let p = &record.properties;
        let processed = match self {
            Self::Checkbox => props::checkbox(p, property),
            Self::Number => props::number(p, property).is_some_and(|n| n != 0.0),
            Self::Status { processed, .. } => props::status_name(p, property) == *processed,
        };
        if processed {
            FlagState::Processed
        } else {
            FlagState::Unprocessed
        }
    }

    /// Filter matching records whose flag is unprocessed.
    pub fn unprocessed_filter(&self, property: &str) -> Filter {
        let property = property.to_string();
        match self {
            Self::Checkbox => Filter::CheckboxEquals {
                property,
                value: false,
            },
            Self::Number => Filter::NumberEquals {
                property,
                value: 0.0,
            },
            Self::Status { unprocessed, .. } => Filter::StatusEquals {
                property,
                value: unprocessed.clone(),
            },
        }
    }

    /// Value that marks a record processed.
    pub fn processed_value(&self) -> PropertyValue {
        match self {
            Self::Checkbox => PropertyValue::Checkbox(true),
            Self::Number => PropertyValue::Number(1.0),
            Self::Status { processed, .. } => PropertyValue::Status(processed.clone()),
        }
    }
}

/// One schedule record, rebuilt from remote state every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleEntity {
    pub id: String,
    pub title: String,
    /// First linked client; empty means unlinked.
    pub client_id: String,
    pub flag: FlagState,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub workload: f64,
    pub parent_task_id: Option<String>,
    pub child_task_ids: Vec<String>,
}

impl ScheduleEntity {
    /// Unprocessed and linked to a client.
    pub fn is_eligible(&self) -> bool {
        self.flag == FlagState::Unprocessed && !self.client_id.is_empty()
    }
}

/// Map a raw page to a `ScheduleEntity`. Never fails: missing or malformed
/// fields come out empty.
pub fn to_schedule_entity(
    record: &RawRecord,
    map: &PropertyMap,
    flag_kind: &FlagKind,
) -> ScheduleEntity {
    let p = &record.properties;

    let client_id = props::relation_ids(p, &map.client)
        .into_iter()
        .next()
        .unwrap_or_default();

    let workload = props::number(p, &map.workload)
        .or_else(|| props::formula_number(p, &map.workload))
        .unwrap_or(0.0);

    // A single date property carries both ends; separate properties are
    // read for their start.
    let start_date = props::date_start(p, &map.start_date);
    let end_date = if map.end_date == map.start_date {
        props::date_end(p, &map.end_date)
    } else {
        props::date_start(p, &map.end_date)
    };

    let (parent_task_id, child_task_ids) = match map.hierarchy() {
        Some((parent, children)) => (
            props::relation_ids(p, parent).into_iter().next(),
            props::relation_ids(p, children),
        ),
        None => (None, Vec::new()),
    };

    ScheduleEntity {
        id: record.id.clone(),
        title: props::title_text(p, &map.title),
        client_id,
        flag: flag_kind.read(record, &map.flag),
        start_date,
        end_date,
        workload,
        parent_task_id,
        child_task_ids,
    }
}
