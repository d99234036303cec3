//! Typed block updates.
//!
//! Each content variant implements [`ApplyEvent`] for its own partial update
//! type. [`apply_update`] is the single dispatcher: base attributes apply to
//! any block, variant updates must match the block's kind.

use kiroku_types::{
    Block, BlockContent, BlockKind, BlockUpdate, BookmarkContent, BookmarkUpdate, DataviewContent,
    DataviewUpdate, EmbedContent, EmbedUpdate, FileContent, FileUpdate, LinkContent, LinkUpdate,
    TextContent, TextUpdate, View, WidgetContent, WidgetUpdate,
};

use crate::StateError;

/// Merge a typed partial update into concrete block content.
pub trait ApplyEvent {
    type Update;

    fn apply_event(&mut self, update: &Self::Update) -> Result<(), StateError>;
}

fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

impl ApplyEvent for TextContent {
    type Update = TextUpdate;

    fn apply_event(&mut self, update: &TextUpdate) -> Result<(), StateError> {
        set(&mut self.text, &update.text);
        set(&mut self.style, &update.style);
        set(&mut self.marks, &update.marks);
        set(&mut self.checked, &update.checked);
        set(&mut self.color, &update.color);
        set(&mut self.icon_emoji, &update.icon_emoji);
        Ok(())
    }
}

impl ApplyEvent for FileContent {
    type Update = FileUpdate;

    fn apply_event(&mut self, update: &FileUpdate) -> Result<(), StateError> {
        set(&mut self.hash, &update.hash);
        set(&mut self.name, &update.name);
        set(&mut self.kind, &update.kind);
        set(&mut self.mime, &update.mime);
        set(&mut self.size, &update.size);
        set(&mut self.state, &update.state);
        set(&mut self.target_object_id, &update.target_object_id);
        Ok(())
    }
}

impl ApplyEvent for BookmarkContent {
    type Update = BookmarkUpdate;

    fn apply_event(&mut self, update: &BookmarkUpdate) -> Result<(), StateError> {
        set(&mut self.url, &update.url);
        set(&mut self.title, &update.title);
        set(&mut self.description, &update.description);
        set(&mut self.image_hash, &update.image_hash);
        set(&mut self.favicon_hash, &update.favicon_hash);
        set(&mut self.target_object_id, &update.target_object_id);
        set(&mut self.state, &update.state);
        Ok(())
    }
}

impl ApplyEvent for LinkContent {
    type Update = LinkUpdate;

    fn apply_event(&mut self, update: &LinkUpdate) -> Result<(), StateError> {
        set(&mut self.target_block_id, &update.target_block_id);
        set(&mut self.icon_size, &update.icon_size);
        set(&mut self.card_style, &update.card_style);
        set(&mut self.description, &update.description);
        set(&mut self.relations, &update.relations);
        Ok(())
    }
}

impl ApplyEvent for WidgetContent {
    type Update = WidgetUpdate;

    fn apply_event(&mut self, update: &WidgetUpdate) -> Result<(), StateError> {
        set(&mut self.layout, &update.layout);
        set(&mut self.limit, &update.limit);
        set(&mut self.view_id, &update.view_id);
        Ok(())
    }
}

impl ApplyEvent for EmbedContent {
    type Update = EmbedUpdate;

    fn apply_event(&mut self, update: &EmbedUpdate) -> Result<(), StateError> {
        set(&mut self.text, &update.text);
        set(&mut self.processor, &update.processor);
        Ok(())
    }
}

/// The block id is filled in by [`apply_update`].
fn view_or_err<'v>(dataview: &'v mut DataviewContent, view_id: &str) -> Result<&'v mut View, StateError> {
    dataview.view_mut(view_id).ok_or_else(|| StateError::ViewNotFound {
        block: String::new(),
        view: view_id.to_string(),
    })
}

impl ApplyEvent for DataviewContent {
    type Update = DataviewUpdate;

    fn apply_event(&mut self, update: &DataviewUpdate) -> Result<(), StateError> {
        match update {
            DataviewUpdate::ViewSet { view } => match self.view_mut(&view.id) {
                Some(existing) => *existing = view.clone(),
                None => self.views.push(view.clone()),
            },
            DataviewUpdate::ViewUpdate {
                view_id,
                name,
                kind,
                page_limit,
                group_relation_key,
            } => {
                let view = view_or_err(self, view_id)?;
                set(&mut view.name, name);
                set(&mut view.kind, kind);
                set(&mut view.page_limit, page_limit);
                set(&mut view.group_relation_key, group_relation_key);
            }
            DataviewUpdate::ViewDelete { view_id } => {
                view_or_err(self, view_id)?;
                self.views.retain(|v| &v.id != view_id);
            }
            DataviewUpdate::ViewOrder { view_ids } => {
                let mut ordered = Vec::with_capacity(self.views.len());
                for id in view_ids {
                    if let Some(pos) = self.views.iter().position(|v| &v.id == id) {
                        ordered.push(self.views.remove(pos));
                    }
                }
                ordered.append(&mut self.views);
                self.views = ordered;
            }
            DataviewUpdate::SortsSet { view_id, sorts } => {
                view_or_err(self, view_id)?.sorts = sorts.clone();
            }
            DataviewUpdate::FiltersSet { view_id, filters } => {
                view_or_err(self, view_id)?.filters = filters.clone();
            }
            DataviewUpdate::ViewRelationsSet { view_id, relations } => {
                view_or_err(self, view_id)?.relations = relations.clone();
            }
            DataviewUpdate::SourceSet { source } => self.source = source.clone(),
            DataviewUpdate::TargetObjectIdSet { target_object_id } => {
                self.target_object_id = target_object_id.clone();
            }
            DataviewUpdate::IsCollectionSet { is_collection } => self.is_collection = *is_collection,
            DataviewUpdate::RelationLinksAdd { links } => {
                for link in links {
                    if !self.relation_links.iter().any(|l| l.key == link.key) {
                        self.relation_links.push(link.clone());
                    }
                }
            }
            DataviewUpdate::RelationLinksRemove { keys } => {
                self.relation_links.retain(|l| !keys.contains(&l.key));
            }
        }
        Ok(())
    }
}

fn not_that_kind(id: &str, expected: BlockKind, actual: BlockKind) -> StateError {
    StateError::NotThatKind {
        id: id.to_string(),
        expected,
        actual,
    }
}

/// Applies one typed update to a block.
pub fn apply_update(block: &mut Block, update: &BlockUpdate) -> Result<(), StateError> {
    let actual = block.kind();
    match (update, &mut block.content) {
        (BlockUpdate::Fields(fields), _) => {
            for (key, value) in fields {
                if value.is_null() {
                    block.fields.remove(key);
                } else {
                    block.fields.insert(key.clone(), value.clone());
                }
            }
        }
        (BlockUpdate::BackgroundColor(color), _) => block.background_color = color.clone(),
        (BlockUpdate::Align(align), _) => block.align = *align,
        (BlockUpdate::VerticalAlign(align), _) => block.vertical_align = *align,

        (BlockUpdate::Text(update), BlockContent::Text(text)) => text.apply_event(update)?,
        (BlockUpdate::File(update), BlockContent::File(file)) => file.apply_event(update)?,
        (BlockUpdate::Bookmark(update), BlockContent::Bookmark(bookmark)) => bookmark.apply_event(update)?,
        (BlockUpdate::Link(update), BlockContent::Link(link)) => link.apply_event(update)?,
        (BlockUpdate::Widget(update), BlockContent::Widget(widget)) => widget.apply_event(update)?,
        (BlockUpdate::Embed(update), BlockContent::Embed(embed)) => embed.apply_event(update)?,
        (BlockUpdate::Div(style), BlockContent::Div(div)) => div.style = *style,
        (BlockUpdate::TableRow { is_header }, BlockContent::TableRow(row)) => row.is_header = *is_header,
        (BlockUpdate::Relation { key }, BlockContent::Relation(relation)) => relation.key = key.clone(),
        (BlockUpdate::Dataview(update), BlockContent::Dataview(dataview)) => {
            dataview.apply_event(update).map_err(|err| match err {
                StateError::ViewNotFound { view, .. } => StateError::ViewNotFound {
                    block: block.id.clone(),
                    view,
                },
                other => other,
            })?
        }

        (BlockUpdate::Text(_), _) => return Err(not_that_kind(&block.id, BlockKind::Text, actual)),
        (BlockUpdate::File(_), _) => return Err(not_that_kind(&block.id, BlockKind::File, actual)),
        (BlockUpdate::Bookmark(_), _) => return Err(not_that_kind(&block.id, BlockKind::Bookmark, actual)),
        (BlockUpdate::Link(_), _) => return Err(not_that_kind(&block.id, BlockKind::Link, actual)),
        (BlockUpdate::Widget(_), _) => return Err(not_that_kind(&block.id, BlockKind::Widget, actual)),
        (BlockUpdate::Embed(_), _) => return Err(not_that_kind(&block.id, BlockKind::Embed, actual)),
        (BlockUpdate::Div(_), _) => return Err(not_that_kind(&block.id, BlockKind::Div, actual)),
        (BlockUpdate::TableRow { .. }, _) => return Err(not_that_kind(&block.id, BlockKind::TableRow, actual)),
        (BlockUpdate::Relation { .. }, _) => return Err(not_that_kind(&block.id, BlockKind::Relation, actual)),
        (BlockUpdate::Dataview(_), _) => return Err(not_that_kind(&block.id, BlockKind::Dataview, actual)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::{Align, BlockEvent, TextStyle, Value};

    #[test]
    fn test_text_partial_update() {
        let mut block = Block::text("t", "hello");
        apply_update(
            &mut block,
            &BlockUpdate::Text(TextUpdate {
                style: Some(TextStyle::Header1),
                ..Default::default()
            }),
        )
        .unwrap();
        let BlockContent::Text(text) = &block.content else { panic!("not text") };
        assert_eq!(text.text, "hello");
        assert_eq!(text.style, TextStyle::Header1);
    }

    #[test]
    fn test_not_that_kind() {
        let mut block = Block::text("t", "hello");
        let err = apply_update(&mut block, &BlockUpdate::Embed(EmbedUpdate::default())).unwrap_err();
        assert_eq!(
            err,
            StateError::NotThatKind {
                id: "t".into(),
                expected: BlockKind::Embed,
                actual: BlockKind::Text,
            }
        );
    }

    #[test]
    fn test_base_fields_on_any_kind() {
        let mut block = Block::text("t", "").with_field("width", 0.5);
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("width".to_string(), Value::Null);
        fields.insert("lang".to_string(), Value::from("rust"));
        apply_update(&mut block, &BlockUpdate::Fields(fields)).unwrap();
        apply_update(&mut block, &BlockUpdate::Align(Align::Center)).unwrap();
        assert!(!block.fields.contains_key("width"));
        assert_eq!(block.fields.get("lang"), Some(&Value::from("rust")));
        assert_eq!(block.align, Align::Center);
        let _ = BlockEvent::new("t", BlockUpdate::BackgroundColor("red".into()));
    }

    #[test]
    fn test_dataview_views() {
        let mut block = Block::new("dv", BlockContent::Dataview(DataviewContent::default()));
        for id in ["v1", "v2", "v3"] {
            let view = View {
                id: id.into(),
                ..Default::default()
            };
            apply_update(&mut block, &BlockUpdate::Dataview(DataviewUpdate::ViewSet { view })).unwrap();
        }
        apply_update(
            &mut block,
            &BlockUpdate::Dataview(DataviewUpdate::ViewOrder {
                view_ids: vec!["v3".into(), "v1".into()],
            }),
        )
        .unwrap();
        let err = apply_update(
            &mut block,
            &BlockUpdate::Dataview(DataviewUpdate::ViewDelete { view_id: "nope".into() }),
        )
        .unwrap_err();
        assert!(matches!(err, StateError::ViewNotFound { .. }));

        let BlockContent::Dataview(dv) = &block.content else { panic!("not a dataview") };
        let order: Vec<&str> = dv.views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(order, vec!["v3", "v1", "v2"]);
    }
}
