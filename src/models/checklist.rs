use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AppError, AppResult};

use super::InspectionType;

/// Reserved id of the free-text category; it feeds `generalComments` and
/// never becomes part of the checklist tree.
pub const COMMENTS_CATEGORY_ID: &str = "comments";

const DEFAULT_DEFINITION: &str = include_str!("../../checklists/default.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pass,
    Fail,
    #[default]
    Unset,
}

impl ItemStatus {
    /// Text used in exported documents.
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Pass => "pass",
            ItemStatus::Fail => "fail",
            ItemStatus::Unset => "n/a",
        }
    }
}

// Older records store an unanswered item as `null`.
fn deserialize_status<'de, D>(deserializer: D) -> Result<ItemStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ItemStatus>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemState {
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: ItemStatus,
    #[serde(default)]
    pub comment: String,
}

/// Partial update of one checklist item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// String-keyed map that keeps insertion order through serde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Replaces the value in place if the key exists, appends otherwise.
    pub fn insert(&mut self, key: String, value: V) {
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::default();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// category id -> item id -> state, in definition order.
pub type ChecklistTree = OrderedMap<OrderedMap<ItemState>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
    /// Marks a free-text-only category.
    #[serde(default, rename = "commentsOnly")]
    pub comments_only: bool,
}

impl CategoryDefinition {
    pub fn is_comments(&self) -> bool {
        self.comments_only || self.id == COMMENTS_CATEGORY_ID
    }
}

/// Versionable description of the inspection form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistDefinition {
    pub categories: Vec<CategoryDefinition>,
    #[serde(default)]
    pub inspection_types: Vec<String>,
}

impl ChecklistDefinition {
    pub fn from_json(json: &str) -> AppResult<Self> {
        let definition: ChecklistDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// The definition compiled into the binary.
    pub fn builtin() -> AppResult<Self> {
        Self::from_json(DEFAULT_DEFINITION)
    }

    pub async fn load(path: &std::path::Path) -> AppResult<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("failed to read checklist {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded checklist definition from {}", path.display());
        Self::from_json(&json)
    }

    fn validate(&self) -> AppResult<()> {
        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if category.id.trim().is_empty() {
                return Err(AppError::Config("checklist category with empty id".to_string()));
            }
            if !seen.insert(category.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate checklist category: {}",
                    category.id
                )));
            }
            let mut items = std::collections::HashSet::new();
            for item in &category.items {
                if !items.insert(item.id.as_str()) {
                    return Err(AppError::Config(format!(
                        "duplicate item {} in category {}",
                        item.id, category.id
                    )));
                }
            }
        }
        for name in &self.inspection_types {
            name.parse::<InspectionType>()
                .map_err(|_| AppError::Config(format!("unsupported inspection type: {}", name)))?;
        }
        Ok(())
    }

    /// Inspection types offered by this definition, or all of them when the
    /// definition lists none.
    pub fn inspection_types(&self) -> Vec<InspectionType> {
        let parsed: Vec<InspectionType> = self
            .inspection_types
            .iter()
            .filter_map(|t| t.parse().ok())
            .collect();
        if parsed.is_empty() {
            InspectionType::ALL.to_vec()
        } else {
            parsed
        }
    }

    pub fn checklist_categories(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.iter().filter(|c| !c.is_comments())
    }
}

/// Fresh tree for a definition: every item present, every item unset.
pub fn build_initial(definition: &ChecklistDefinition) -> ChecklistTree {
    let mut tree = ChecklistTree::default();
    for category in definition.checklist_categories() {
        let mut items = OrderedMap::default();
        for item in &category.items {
            items.insert(item.id.clone(), ItemState::default());
        }
        tree.insert(category.id.clone(), items);
    }
    tree
}

/// Returns a copy of `tree` with one item patched.
pub fn update_item(
    tree: &ChecklistTree,
    category_id: &str,
    item_id: &str,
    patch: ItemPatch,
) -> AppResult<ChecklistTree> {
    let mut next = tree.clone();
    let category = next
        .get_mut(category_id)
        .ok_or_else(|| AppError::not_found(format!("checklist category {}", category_id)))?;
    let item = category.get_mut(item_id).ok_or_else(|| {
        AppError::not_found(format!("checklist item {}/{}", category_id, item_id))
    })?;
    if let Some(status) = patch.status {
        item.status = status;
    }
    if let Some(comment) = patch.comment {
        item.comment = comment;
    }
    Ok(next)
}

/// True when `tree` has exactly the categories and items of `definition`,
/// in the same order.
pub fn conforms_to(tree: &ChecklistTree, definition: &ChecklistDefinition) -> bool {
    let categories: Vec<&CategoryDefinition> = definition.checklist_categories().collect();
    if categories.len() != tree.len() {
        return false;
    }
    categories
        .iter()
        .zip(tree.iter())
        .all(|(def, (id, items))| {
            def.id == id
                && def.items.len() == items.len()
                && def.items.iter().zip(items.keys()).all(|(i, k)| i.id == k)
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChecklistSummary {
    pub pass: usize,
    pub fail: usize,
    pub unset: usize,
}

pub fn summarize(tree: &ChecklistTree) -> ChecklistSummary {
    let mut summary = ChecklistSummary::default();
    for (_, items) in tree.iter() {
        for (_, state) in items.iter() {
            match state.status {
                ItemStatus::Pass => summary.pass += 1,
                ItemStatus::Fail => summary.fail += 1,
                ItemStatus::Unset => summary.unset += 1,
            }
        }
    }
    summary
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn two_by_two() -> ChecklistDefinition {
        ChecklistDefinition::from_json(
            r#"{
                "categories": [
                    {"id": "tyres", "label": "Tyres", "items": [
                        {"id": "front_left", "label": "Front left"},
                        {"id": "front_right", "label": "Front right"}
                    ]},
                    {"id": "lights", "label": "Lights", "items": [
                        {"id": "headlights", "label": "Headlights"},
                        {"id": "indicators", "label": "Indicators"}
                    ]},
                    {"id": "comments", "label": "Comments", "items": []}
                ],
                "inspectionTypes": ["Initial", "Second", "Final"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_initial_skips_comments_and_keeps_order() {
        let tree = build_initial(&two_by_two());
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["tyres", "lights"]);
        let tyres = tree.get("tyres").unwrap();
        assert_eq!(
            tyres.keys().collect::<Vec<_>>(),
            vec!["front_left", "front_right"]
        );
        assert!(tree
            .iter()
            .flat_map(|(_, items)| items.iter())
            .all(|(_, s)| s.status == ItemStatus::Unset && s.comment.is_empty()));
        assert!(conforms_to(&tree, &two_by_two()));
    }

    #[test]
    fn test_build_initial_is_deterministic() {
        let def = two_by_two();
        assert_eq!(build_initial(&def), build_initial(&def));
    }

    #[test]
    fn test_update_item_only_touches_target() {
        let before = build_initial(&two_by_two());
        let after = update_item(
            &before,
            "lights",
            "indicators",
            ItemPatch {
                status: Some(ItemStatus::Fail),
                comment: Some("left rear flickers".to_string()),
            },
        )
        .unwrap();

        for (cat, items) in after.iter() {
            for (item, state) in items.iter() {
                let old = before.get(cat).unwrap().get(item).unwrap();
                if cat == "lights" && item == "indicators" {
                    assert_eq!(state.status, ItemStatus::Fail);
                    assert_eq!(state.comment, "left rear flickers");
                } else {
                    assert_eq!(state, old);
                }
            }
        }
        // input untouched
        assert_eq!(before, build_initial(&two_by_two()));
    }

    #[test]
    fn test_update_item_unknown_keys() {
        let tree = build_initial(&two_by_two());
        let err = update_item(&tree, "brakes", "pads", ItemPatch::default()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = update_item(&tree, "tyres", "spare", ItemPatch::default()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_tree_json_keeps_order_and_reads_null_status() {
        let json = r#"{"zeta":{"b":{"status":null,"comment":""},"a":{"status":"pass"}},"alpha":{}}"#;
        let tree: ChecklistTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        let zeta = tree.get("zeta").unwrap();
        assert_eq!(zeta.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(zeta.get("b").unwrap().status, ItemStatus::Unset);
        assert_eq!(zeta.get("a").unwrap().status, ItemStatus::Pass);

        let out = serde_json::to_string(&tree).unwrap();
        assert!(out.starts_with(r#"{"zeta":{"b":{"status":"unset""#));
    }

    #[test]
    fn test_builtin_definition_loads() {
        let def = ChecklistDefinition::builtin().unwrap();
        assert!(def.checklist_categories().count() > 0);
        assert!(def.categories.iter().any(|c| c.is_comments()));
        assert_eq!(def.inspection_types(), InspectionType::ALL.to_vec());
    }

    #[test]
    fn test_definition_rejects_duplicates_and_unknown_types() {
        let dup = r#"{"categories":[{"id":"a","label":"A","items":[]},{"id":"a","label":"A","items":[]}]}"#;
        assert!(matches!(
            ChecklistDefinition::from_json(dup),
            Err(AppError::Config(_))
        ));
        let bad_type = r#"{"categories":[],"inspectionTypes":["Weekly"]}"#;
        assert!(matches!(
            ChecklistDefinition::from_json(bad_type),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_summarize() {
        let tree = build_initial(&two_by_two());
        let tree = update_item(
            &tree,
            "tyres",
            "front_left",
            ItemPatch {
                status: Some(ItemStatus::Pass),
                comment: None,
            },
        )
        .unwrap();
        assert_eq!(
            summarize(&tree),
            ChecklistSummary {
                pass: 1,
                fail: 0,
                unset: 3
            }
        );
    }
}
