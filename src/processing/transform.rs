//! Record → [`CustomerEvent`] transformation driven by the dataset's column roles and event rules.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{IngestError, IngestResult};
use crate::types::{
    ColumnRole, CustomerEvent, CustomerEventProperty, EventTypeRule, FileDataset, PropertyRule, Record, Value,
};

/// Builds events from mapped records. Deterministic; never touches the database.
#[derive(Debug, Clone)]
pub struct Transformer {
    dataset: Arc<FileDataset>,
    rules: Vec<EventTypeRule>,
    customer_id_column: String,
    job_id: Option<i64>,
}

impl Transformer {
    /// Fails with [`IngestError::InvalidDataset`] when the dataset has no customer id column or
    /// no way to determine an event type.
    pub fn new(dataset: Arc<FileDataset>, job_id: Option<i64>) -> IngestResult<Self> {
        let customer_id_column = dataset
            .column_with_role(&ColumnRole::CustomerId)
            .map(|c| c.name.clone())
            .ok_or_else(|| IngestError::InvalidDataset {
                dataset: dataset.name.clone(),
                message: "no column has the customer_id role".to_string(),
            })?;

        let rules = if dataset.event_types.is_empty() {
            vec![implicit_rule(&dataset)?]
        } else {
            dataset.event_types.clone()
        };
        for rule in &rules {
            if rule.event_type_id.is_none() && rule.event_type_column.is_none() {
                return Err(IngestError::InvalidDataset {
                    dataset: dataset.name.clone(),
                    message: "event rule needs an event_type_id or an event_type_column".to_string(),
                });
            }
        }

        Ok(Self {
            dataset,
            rules,
            customer_id_column,
            job_id,
        })
    }

    pub fn dataset(&self) -> &Arc<FileDataset> {
        &self.dataset
    }

    pub fn job_id(&self) -> Option<i64> {
        self.job_id
    }

    /// Zero or more events for one record, in rule order.
    pub fn transform(&self, record: &Record) -> IngestResult<Vec<CustomerEvent>> {
        let customer_id = match record.get(&self.customer_id_column) {
            Some(v) if !v.is_blank() => v.to_string(),
            _ => {
                return Err(IngestError::InvalidFormat {
                    column: self.customer_id_column.clone(),
                    raw: String::new(),
                    message: "customer id is required".to_string(),
                });
            }
        };
        let customer_id_type_id = self.customer_id_type_id(record)?;
        let ts = self.timestamp(record)?;
        let source_key = self
            .role_value(record, &ColumnRole::SourceKey)
            .filter(|v| !v.is_blank())
            .map_or_else(|| self.dataset.name.clone(), Value::to_string);

        let mut events = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let Some(event_type_id) = self.event_type_id(rule, record)? else {
                continue;
            };
            let value = rule
                .value_column
                .as_ref()
                .and_then(|c| record.get(c))
                .cloned()
                .unwrap_or(Value::Null);
            if rule.skip_if_empty && value.is_blank() {
                continue;
            }
            events.push(CustomerEvent {
                customer_id_type_id,
                customer_id: customer_id.clone(),
                event_type_id,
                ts,
                value,
                source_key: source_key.clone(),
                job_id: self.job_id,
                properties: self.properties(&rule.properties, record),
            });
        }
        Ok(events)
    }

    fn role_value<'r>(&self, record: &'r Record, role: &ColumnRole) -> Option<&'r Value> {
        self.dataset
            .column_with_role(role)
            .and_then(|c| record.get(&c.name))
    }

    fn customer_id_type_id(&self, record: &Record) -> IngestResult<i32> {
        let Some(column) = self.dataset.column_with_role(&ColumnRole::CustomerIdType) else {
            return Ok(self.dataset.customer_id_type_id);
        };
        Ok(record
            .get(&column.name)
            .map(|v| to_i32(&column.name, v))
            .transpose()?
            .flatten()
            .unwrap_or(self.dataset.customer_id_type_id))
    }

    fn event_type_id(&self, rule: &EventTypeRule, record: &Record) -> IngestResult<Option<i32>> {
        if let Some(id) = rule.event_type_id {
            return Ok(Some(id));
        }
        let Some(column) = rule.event_type_column.as_deref() else {
            return Ok(None);
        };
        match record.get(column) {
            Some(v) => to_i32(column, v),
            None => Ok(None),
        }
    }

    fn timestamp(&self, record: &Record) -> IngestResult<Option<NaiveDateTime>> {
        let Some(column) = self.dataset.column_with_role(&ColumnRole::Timestamp) else {
            return Ok(None);
        };
        match record.get(&column.name) {
            Some(Value::Utf8(raw)) if !raw.trim().is_empty() => {
                parse_timestamp(raw.trim(), &self.dataset.timestamp_format)
                    .map(Some)
                    .ok_or_else(|| IngestError::InvalidFormat {
                        column: column.name.clone(),
                        raw: raw.clone(),
                        message: format!(
                            "expected a timestamp in '{}' or RFC 3339",
                            self.dataset.timestamp_format
                        ),
                    })
            }
            Some(Value::Int64(epoch)) => DateTime::from_timestamp(*epoch, 0)
                .map(|dt| Some(dt.naive_utc()))
                .ok_or_else(|| IngestError::InvalidFormat {
                    column: column.name.clone(),
                    raw: epoch.to_string(),
                    message: "epoch seconds out of range".to_string(),
                }),
            _ => Ok(None),
        }
    }

    fn properties(&self, rules: &[PropertyRule], record: &Record) -> Vec<CustomerEventProperty> {
        rules
            .iter()
            .filter_map(|rule| {
                let value = record.get(&rule.column).filter(|v| !v.is_null())?;
                let value_type = self.dataset.column(&rule.column).map(|c| c.value_type.clone());
                Some(CustomerEventProperty::new(
                    rule.property_type_id,
                    value_type,
                    value.clone(),
                ))
            })
            .collect()
    }
}

fn implicit_rule(dataset: &FileDataset) -> IngestResult<EventTypeRule> {
    let event_type_column = dataset
        .column_with_role(&ColumnRole::EventType)
        .map(|c| c.name.clone())
        .ok_or_else(|| IngestError::InvalidDataset {
            dataset: dataset.name.clone(),
            message: "no event_types rules and no column has the event_type role".to_string(),
        })?;
    let properties = dataset
        .columns
        .iter()
        .filter_map(|c| match c.role {
            Some(ColumnRole::Property { property_type_id }) => Some(PropertyRule {
                column: c.name.clone(),
                property_type_id,
            }),
            _ => None,
        })
        .collect();
    Ok(EventTypeRule {
        event_type_id: None,
        event_type_column: Some(event_type_column),
        value_column: dataset
            .column_with_role(&ColumnRole::EventValue)
            .map(|c| c.name.clone()),
        properties,
        skip_if_empty: false,
    })
}

/// Blank → `None`; anything else must be an integer that fits an `i32`.
fn to_i32(column: &str, value: &Value) -> IngestResult<Option<i32>> {
    let invalid = |raw: String, message: &str| IngestError::InvalidFormat {
        column: column.to_string(),
        raw,
        message: message.to_string(),
    };
    match value {
        Value::Null => Ok(None),
        Value::Int64(v) => i32::try_from(*v)
            .map(Some)
            .map_err(|_| invalid(v.to_string(), "integer out of range")),
        Value::Utf8(s) if s.trim().is_empty() => Ok(None),
        Value::Utf8(s) => s
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|e| invalid(s.clone(), &e.to_string())),
    }
}

fn parse_timestamp(raw: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, format)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
