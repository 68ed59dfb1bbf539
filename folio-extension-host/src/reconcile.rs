//! Change reconciliation engine.
//!
//! Validates an ordered operation batch against a live data object, applies
//! it atomically, and computes which declared event handlers fire and with
//! what payload. Batches are applied to a working copy of the container and
//! committed whole, so a rejected batch leaves the object untouched.

use crate::error::ExtensionHostError;
use crate::livedata::{ChangeRecord, LiveDataContainer, LiveDataObject, LiveDataOperationKind};
use folio_extension_sdk::protocol::LiveDataOperation;
use serde_json::{json, Value};

/// One event-handler invocation produced by a batch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HandlerFire {
    pub handler: String,
    /// Event-scoped payload: `{ "current": ..., "changed": [...] }`.
    pub event: Value,
}

/// Parses raw wire operations, rejecting the whole batch on the first
/// unrecognized kind.
pub(crate) fn parse_operations(
    object_name: &str,
    raw: &[Value],
) -> Result<Vec<LiveDataOperation>, ExtensionHostError> {
    raw.iter()
        .map(|value| {
            LiveDataOperation::from_wire(value).map_err(|err| {
                ExtensionHostError::UnrecognizedOperation {
                    object: object_name.to_string(),
                    detail: err.to_string(),
                }
            })
        })
        .collect()
}

/// Applies a validated batch in listed order, returning one change record
/// per applied operation (one per element for run inserts).
///
/// Array record indices are adjusted as later operations shift elements, so
/// a record always points at the element it produced; the index becomes
/// `None` once that element is removed.
pub(crate) fn apply_batch(
    object: &mut LiveDataObject,
    operations: &[LiveDataOperation],
) -> Result<Vec<ChangeRecord>, ExtensionHostError> {
    let name = object.name().to_string();
    let kind = object.kind().as_str();
    let mut working = object.container().clone();
    let mut records: Vec<ChangeRecord> = Vec::new();

    for operation in operations {
        match (&mut working, operation) {
            (LiveDataContainer::Array(items), LiveDataOperation::Insert { index, item }) => {
                if *index > items.len() {
                    return Err(ExtensionHostError::IndexOutOfBounds {
                        object: name,
                        index: *index,
                        len: items.len(),
                    });
                }
                let run: Vec<Value> = match item {
                    Value::Array(values) => values.clone(),
                    value => vec![value.clone()],
                };
                for record in records.iter_mut() {
                    if let Some(at) = record.index {
                        if at >= *index {
                            record.index = Some(at + run.len());
                        }
                    }
                }
                for (offset, value) in run.iter().enumerate() {
                    records.push(ChangeRecord {
                        kind: LiveDataOperationKind::Insert,
                        index: Some(index + offset),
                        key: None,
                        value: value.clone(),
                    });
                }
                items.splice(*index..*index, run);
            }

            (LiveDataContainer::Array(items), LiveDataOperation::Update { index, item }) => {
                if *index >= items.len() {
                    return Err(ExtensionHostError::IndexOutOfBounds {
                        object: name,
                        index: *index,
                        len: items.len(),
                    });
                }
                items[*index] = item.clone();
                records.push(ChangeRecord {
                    kind: LiveDataOperationKind::Update,
                    index: Some(*index),
                    key: None,
                    value: item.clone(),
                });
            }

            (
                LiveDataContainer::Array(items),
                LiveDataOperation::Remove {
                    index: Some(index),
                    key: None,
                },
            ) => {
                if *index >= items.len() {
                    return Err(ExtensionHostError::IndexOutOfBounds {
                        object: name,
                        index: *index,
                        len: items.len(),
                    });
                }
                let removed = items.remove(*index);
                for record in records.iter_mut() {
                    match record.index {
                        Some(at) if at == *index => record.index = None,
                        Some(at) if at > *index => record.index = Some(at - 1),
                        _ => {}
                    }
                }
                records.push(ChangeRecord {
                    kind: LiveDataOperationKind::Remove,
                    index: None,
                    key: None,
                    value: removed,
                });
            }

            (LiveDataContainer::Map(entries), LiveDataOperation::Set { key, item }) => {
                entries.insert(key.clone(), item.clone());
                records.push(ChangeRecord {
                    kind: LiveDataOperationKind::Set,
                    index: None,
                    key: Some(key.clone()),
                    value: item.clone(),
                });
            }

            (
                LiveDataContainer::Map(entries),
                LiveDataOperation::Remove {
                    key: Some(key),
                    index: None,
                },
            ) => {
                let removed = entries.remove(key).ok_or_else(|| ExtensionHostError::UnknownKey {
                    object: name.clone(),
                    key: key.clone(),
                })?;
                records.push(ChangeRecord {
                    kind: LiveDataOperationKind::Remove,
                    index: None,
                    key: Some(key.clone()),
                    value: removed,
                });
            }

            (container, LiveDataOperation::Clear) => {
                *container = LiveDataContainer::empty(object.kind());
                for record in records.iter_mut() {
                    record.index = None;
                }
                records.push(ChangeRecord {
                    kind: LiveDataOperationKind::Clear,
                    index: None,
                    key: None,
                    value: Value::Null,
                });
            }

            (_, LiveDataOperation::Remove { index: None, key: None }) => {
                return Err(ExtensionHostError::UnrecognizedOperation {
                    object: name,
                    detail: "remove requires an index or a key".to_string(),
                });
            }

            (_, mismatched) => {
                return Err(ExtensionHostError::OperationMismatch {
                    object: name,
                    operation: operation_name(mismatched),
                    kind,
                });
            }
        }
    }

    object.commit(working);
    Ok(records)
}

fn operation_name(operation: &LiveDataOperation) -> &'static str {
    match operation {
        LiveDataOperation::Insert { .. } => "Insert",
        LiveDataOperation::Update { .. } => "Update",
        LiveDataOperation::Remove { .. } => "Remove",
        LiveDataOperation::Clear => "Clear",
        LiveDataOperation::Set { .. } => "Set",
    }
}

/// Computes the handler fires for an applied batch.
///
/// Each declared handler fires at most once for the coalesced portion of a
/// batch; properties whose policy marks them non-collapsible fire
/// separately, after the coalesced fire, in record order.
pub(crate) fn compute_fires(object: &LiveDataObject, records: &[ChangeRecord]) -> Vec<HandlerFire> {
    let definition = object.definition();
    let mut fires = Vec::new();

    // Distinct policy keys in first-touch order.
    let mut keys: Vec<&'static str> = Vec::new();
    for record in records {
        let key = record.kind.policy_key();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    for key in keys {
        let Some(policy) = definition.policy(key) else {
            continue;
        };
        let group: Vec<&ChangeRecord> = records
            .iter()
            .filter(|record| record.kind.policy_key() == key)
            .collect();

        match object.container() {
            LiveDataContainer::Array(_) => {
                // Arrays have no property policies; the whole group
                // coalesces into one fire. `current` is the value of the
                // record holding the highest post-batch index.
                let changed: Vec<Value> = group.iter().map(|record| record.value.clone()).collect();
                let current = group
                    .iter()
                    .copied()
                    .filter(|record| record.index.is_some())
                    .max_by_key(|record| record.index)
                    .or_else(|| group.last().copied())
                    .map(|record| record.value.clone())
                    .unwrap_or(Value::Null);
                fires.push(HandlerFire {
                    handler: policy.handler.clone(),
                    event: json!({ "current": current, "changed": changed }),
                });
            }

            LiveDataContainer::Map(_) => {
                let current = object.container().snapshot();
                let mut collapsed: Vec<(Option<String>, Value)> = Vec::new();
                let mut individual: Vec<&ChangeRecord> = Vec::new();

                for record in group {
                    let property = policy.policy_for(record.key.as_deref());
                    if !property.update {
                        continue;
                    }
                    if property.collapse {
                        if let Some(entry) =
                            collapsed.iter_mut().find(|(key, _)| *key == record.key)
                        {
                            entry.1 = record.value.clone();
                        } else {
                            collapsed.push((record.key.clone(), record.value.clone()));
                        }
                    } else {
                        individual.push(record);
                    }
                }

                if !collapsed.is_empty() {
                    let changed: Vec<Value> = collapsed.into_iter().map(|(_, value)| value).collect();
                    fires.push(HandlerFire {
                        handler: policy.handler.clone(),
                        event: json!({ "current": current, "changed": changed }),
                    });
                }
                for record in individual {
                    fires.push(HandlerFire {
                        handler: policy.handler.clone(),
                        event: json!({ "current": current, "changed": [record.value] }),
                    });
                }
            }
        }
    }

    fires
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{
        LiveDataEventPolicy, LiveDataKind, LiveDataObjectDefinition, PropertyPolicy,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn array_object() -> LiveDataObject {
        let mut event_policy = BTreeMap::new();
        event_policy.insert(
            "add".to_string(),
            LiveDataEventPolicy {
                handler: "onEntityAdded".to_string(),
                property_policies: BTreeMap::new(),
            },
        );
        event_policy.insert(
            "update".to_string(),
            LiveDataEventPolicy {
                handler: "onEntityChanged".to_string(),
                property_policies: BTreeMap::new(),
            },
        );
        LiveDataObject::new(Arc::new(LiveDataObjectDefinition {
            uri: "folioext:hello:10".to_string(),
            name: "entityList".to_string(),
            kind: LiveDataKind::Array,
            event_policy,
        }))
    }

    fn map_object() -> LiveDataObject {
        let mut set_policies = BTreeMap::new();
        set_policies.insert(
            "*".to_string(),
            PropertyPolicy {
                update: false,
                collapse: true,
            },
        );
        set_policies.insert(
            "alive".to_string(),
            PropertyPolicy {
                update: true,
                collapse: true,
            },
        );
        set_policies.insert(
            "position".to_string(),
            PropertyPolicy {
                update: true,
                collapse: true,
            },
        );
        set_policies.insert(
            "rotation".to_string(),
            PropertyPolicy {
                update: true,
                collapse: true,
            },
        );
        set_policies.insert(
            "heading".to_string(),
            PropertyPolicy {
                update: true,
                collapse: false,
            },
        );

        let mut event_policy = BTreeMap::new();
        event_policy.insert(
            "set".to_string(),
            LiveDataEventPolicy {
                handler: "onDeviceUpdate".to_string(),
                property_policies: set_policies,
            },
        );
        LiveDataObject::new(Arc::new(LiveDataObjectDefinition {
            uri: "folioext:hello:10".to_string(),
            name: "deviceState".to_string(),
            kind: LiveDataKind::Map,
            event_policy,
        }))
    }

    fn ops(raw: Vec<Value>) -> Vec<LiveDataOperation> {
        parse_operations("test", &raw).unwrap()
    }

    // ================================================================
    // Array batches
    // ================================================================

    #[test]
    fn triple_prepend_fires_add_once_with_last_run_value() {
        let mut object = array_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::insert(0, json!(2)),
                LiveDataOperation::insert(0, json!(1)),
                LiveDataOperation::insert(0, json!(0)),
            ]),
        )
        .unwrap();

        assert_eq!(object.container().snapshot(), json!([0, 1, 2]));
        assert_eq!(records.len(), 3);

        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].handler, "onEntityAdded");
        assert_eq!(fires[0].event["current"], json!(2));
        assert_eq!(fires[0].event["changed"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn run_insert_fires_add_once_with_last_run_element() {
        let mut object = array_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![LiveDataOperation::insert(0, json!([101, 102, 103]))]),
        )
        .unwrap();

        assert_eq!(object.container().snapshot(), json!([101, 102, 103]));
        assert_eq!(records.len(), 3);

        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].event["current"], json!(103));
        assert_eq!(fires[0].event["changed"], json!([101, 102, 103]));
    }

    #[test]
    fn update_fires_update_handler() {
        let mut object = array_object();
        apply_batch(&mut object, &ops(vec![LiveDataOperation::insert(0, json!([0, 1, 2]))]))
            .unwrap();

        let records = apply_batch(&mut object, &ops(vec![LiveDataOperation::update(0, json!(10))]))
            .unwrap();
        assert_eq!(object.container().snapshot(), json!([10, 1, 2]));

        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].handler, "onEntityChanged");
        assert_eq!(fires[0].event["current"], json!(10));
        assert_eq!(fires[0].event["changed"], json!([10]));
    }

    #[test]
    fn remove_shifts_elements_and_fires_nothing_without_policy() {
        let mut object = array_object();
        apply_batch(&mut object, &ops(vec![LiveDataOperation::insert(0, json!([0, 1, 2]))]))
            .unwrap();

        let records =
            apply_batch(&mut object, &ops(vec![LiveDataOperation::remove(0)])).unwrap();
        assert_eq!(object.container().snapshot(), json!([1, 2]));
        assert_eq!(records[0].value, json!(0));

        // entityList declares no "remove" policy.
        assert!(compute_fires(&object, &records).is_empty());
    }

    #[test]
    fn clear_empties_and_fresh_insert_behaves_as_on_empty() {
        let mut object = array_object();
        apply_batch(&mut object, &ops(vec![LiveDataOperation::insert(0, json!([0, 1, 2]))]))
            .unwrap();

        apply_batch(&mut object, &ops(vec![LiveDataOperation::clear()])).unwrap();
        assert_eq!(object.container().snapshot(), json!([]));

        let records = apply_batch(
            &mut object,
            &ops(vec![LiveDataOperation::insert(0, json!([101, 102, 103]))]),
        )
        .unwrap();
        assert_eq!(object.container().snapshot(), json!([101, 102, 103]));
        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].event["current"], json!(103));
    }

    #[test]
    fn mixed_batch_fires_each_mapped_handler_once() {
        let mut object = array_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::insert(0, json!([0, 1])),
                LiveDataOperation::update(1, json!(7)),
            ]),
        )
        .unwrap();

        assert_eq!(object.container().snapshot(), json!([0, 7]));
        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 2);
        assert_eq!(fires[0].handler, "onEntityAdded");
        assert_eq!(fires[1].handler, "onEntityChanged");
    }

    // ================================================================
    // Map batches
    // ================================================================

    #[test]
    fn map_multi_set_collapses_into_one_fire() {
        let mut object = map_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::set("position", json!("pos")),
                LiveDataOperation::set("rotation", json!(7.9)),
            ]),
        )
        .unwrap();

        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].handler, "onDeviceUpdate");
        assert_eq!(fires[0].event["changed"].as_array().unwrap().len(), 2);
        assert_eq!(
            fires[0].event["current"],
            json!({ "position": "pos", "rotation": 7.9 })
        );
    }

    #[test]
    fn collapsible_key_touched_twice_contributes_latest_value_once() {
        let mut object = map_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::set("position", json!("first")),
                LiveDataOperation::set("position", json!("second")),
            ]),
        )
        .unwrap();

        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].event["changed"], json!(["second"]));
    }

    #[test]
    fn non_collapsible_key_fires_separately_after_collapsed_fire() {
        let mut object = map_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::set("heading", json!(90)),
                LiveDataOperation::set("alive", json!(true)),
                LiveDataOperation::set("heading", json!(180)),
            ]),
        )
        .unwrap();

        let fires = compute_fires(&object, &records);
        assert_eq!(fires.len(), 3);
        // Coalesced fire first, then one per non-collapsible record in order.
        assert_eq!(fires[0].event["changed"], json!([true]));
        assert_eq!(fires[1].event["changed"], json!([90]));
        assert_eq!(fires[2].event["changed"], json!([180]));
    }

    #[test]
    fn update_false_property_is_excluded() {
        let mut object = map_object();
        let records = apply_batch(
            &mut object,
            &ops(vec![LiveDataOperation::set("unlisted", json!("hidden"))]),
        )
        .unwrap();

        // The "*" policy declares update: false — the change applies but no
        // handler fires.
        assert_eq!(object.container().snapshot()["unlisted"], json!("hidden"));
        assert!(compute_fires(&object, &records).is_empty());
    }

    #[test]
    fn map_remove_reports_removed_value() {
        let mut object = map_object();
        apply_batch(&mut object, &ops(vec![LiveDataOperation::set("alive", json!(true))]))
            .unwrap();

        let records = apply_batch(
            &mut object,
            &[LiveDataOperation::Remove {
                index: None,
                key: Some("alive".to_string()),
            }],
        )
        .unwrap();
        assert_eq!(records[0].value, json!(true));
        assert!(object.container().is_empty());
    }

    // ================================================================
    // Rejection and atomicity
    // ================================================================

    #[test]
    fn kind_mismatch_rejects_whole_batch_atomically() {
        let mut object = array_object();
        apply_batch(&mut object, &ops(vec![LiveDataOperation::insert(0, json!([0, 1, 2]))]))
            .unwrap();
        let before = object.container().snapshot();

        let result = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::insert(0, json!(99)),
                LiveDataOperation::set("key", json!("value")),
            ]),
        );
        assert!(matches!(
            result,
            Err(ExtensionHostError::OperationMismatch { .. })
        ));
        assert_eq!(object.container().snapshot(), before);
    }

    #[test]
    fn out_of_bounds_rejects_whole_batch_atomically() {
        let mut object = array_object();
        apply_batch(&mut object, &ops(vec![LiveDataOperation::insert(0, json!([0, 1]))]))
            .unwrap();
        let before = object.container().snapshot();

        let result = apply_batch(
            &mut object,
            &ops(vec![
                LiveDataOperation::update(0, json!(5)),
                LiveDataOperation::remove(9),
            ]),
        );
        assert!(matches!(
            result,
            Err(ExtensionHostError::IndexOutOfBounds { index: 9, .. })
        ));
        assert_eq!(object.container().snapshot(), before);
    }

    #[test]
    fn unrecognized_operation_kind_rejects_batch() {
        let result = parse_operations("entityList", &[json!({ "type": "Bad" })]);
        assert!(matches!(
            result,
            Err(ExtensionHostError::UnrecognizedOperation { .. })
        ));
    }

    #[test]
    fn removing_missing_map_key_rejects_batch() {
        let mut object = map_object();
        let result = apply_batch(
            &mut object,
            &[LiveDataOperation::Remove {
                index: None,
                key: Some("ghost".to_string()),
            }],
        );
        assert!(matches!(result, Err(ExtensionHostError::UnknownKey { .. })));
    }
}
