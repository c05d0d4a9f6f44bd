//! A small blog split across two stores.
//!
//! `sql` holds posts, comments and the `post_tags` join table; `docs` holds
//! authors and tags.

#![allow(dead_code)]

use fedorm::prelude::*;
use std::sync::Arc;

pub struct Blog {
    pub sql: Arc<MemoryAdapter>,
    pub docs: Arc<MemoryAdapter>,
    pub adapters: AdapterRegistry,
    pub author: EntityMeta,
    pub post: EntityMeta,
    pub tag: EntityMeta,
    pub comment: EntityMeta,
}

impl Blog {
    pub fn federator(&self) -> QueryFederator<'_> {
        QueryFederator::new(&self.adapters)
    }

    pub fn coordinator(&self) -> PersistenceCoordinator<'_> {
        PersistenceCoordinator::new(&self.adapters)
    }

    pub fn association(&self, entity: &EntityMeta, property: &str) -> Arc<AssociationDescriptor> {
        Arc::clone(entity.association(property).expect("association is declared"))
    }

    pub fn reset_calls(&self) {
        self.sql.reset_calls().unwrap();
        self.docs.reset_calls().unwrap();
    }

    /// Resources selected on `adapter`, in call order.
    pub fn selects(adapter: &MemoryAdapter) -> Vec<String> {
        adapter
            .calls()
            .unwrap()
            .into_iter()
            .filter(|c| c.op == "select")
            .map(|c| c.resource)
            .collect()
    }
}

pub fn blog() -> Blog {
    let sql = MemoryAdapter::new("sql");
    sql.create_table("posts", Some("id")).unwrap();
    sql.seed_json(
        "posts",
        r#"[
            {"id": 1, "title": "Engines", "author_id": 1},
            {"id": 2, "title": "Compilers", "author_id": 2},
            {"id": 3, "title": "Notes", "author_id": 1},
            {"id": 4, "title": "Draft", "author_id": null}
        ]"#,
    )
    .unwrap();
    sql.create_table("comments", Some("id")).unwrap();
    sql.seed_json(
        "comments",
        r#"[
            {"id": 1, "post_id": 1, "body": "nice"},
            {"id": 2, "post_id": 1, "body": "great"},
            {"id": 3, "post_id": 2, "body": "ok"}
        ]"#,
    )
    .unwrap();
    sql.create_table("post_tags", None).unwrap();
    sql.seed_json(
        "post_tags",
        r#"[
            {"post_id": 1, "tag_id": 10},
            {"post_id": 1, "tag_id": 11},
            {"post_id": 2, "tag_id": 10}
        ]"#,
    )
    .unwrap();

    let docs = MemoryAdapter::new("docs");
    docs.create_table("authors", Some("id")).unwrap();
    docs.seed_json(
        "authors",
        r#"[
            {"id": 1, "name": "Ada"},
            {"id": 2, "name": "Grace"},
            {"id": 3, "name": "Linus"}
        ]"#,
    )
    .unwrap();
    docs.create_table("tags", Some("id")).unwrap();
    docs.seed_json(
        "tags",
        r#"[
            {"id": 10, "label": "rust"},
            {"id": 11, "label": "db"},
            {"id": 12, "label": "unused"}
        ]"#,
    )
    .unwrap();

    let sql = Arc::new(sql);
    let docs = Arc::new(docs);
    let adapters = AdapterRegistry::new()
        .with(sql.clone())
        .with(docs.clone());

    let author = EntityMeta::new("Author", "docs", "authors")
        .primary_key("id")
        .field("name");
    let post = EntityMeta::new("Post", "sql", "posts")
        .primary_key("id")
        .fields(["title", "author_id"])
        .computed_field("summary");
    let tag = EntityMeta::new("Tag", "docs", "tags")
        .primary_key("id")
        .field("label");
    let comment = EntityMeta::new("Comment", "sql", "comments")
        .primary_key("id")
        .fields(["post_id", "body"]);

    let post_author = AssociationDescriptor::create(
        AssociationKind::ManyToOne,
        "author",
        &post,
        &author,
        DefinitionTokens::new().referencing_key("author_id"),
        false,
    )
    .unwrap();
    let post_comments = AssociationDescriptor::create(
        AssociationKind::OneToMany,
        "comments",
        &post,
        &comment,
        DefinitionTokens::new()
            .referenced_key("post_id")
            .order_by(OrderBy::asc("id")),
        false,
    )
    .unwrap();
    let post_tags = AssociationDescriptor::create(
        AssociationKind::ManyToMany,
        "tags",
        &post,
        &tag,
        DefinitionTokens::new()
            .join_resource("post_tags")
            .join_key_for_source("post_id")
            .join_key_for_target("tag_id"),
        true,
    )
    .unwrap();
    let author_posts = AssociationDescriptor::create(
        AssociationKind::OneToMany,
        "posts",
        &author,
        &post,
        DefinitionTokens::new()
            .referenced_key("author_id")
            .order_by(OrderBy::asc("id")),
        false,
    )
    .unwrap();
    // The join table lives with posts, on the target side.
    let tag_posts = AssociationDescriptor::create(
        AssociationKind::ManyToMany,
        "posts",
        &tag,
        &post,
        DefinitionTokens::new()
            .join_resource("post_tags")
            .join_key_for_source("tag_id")
            .join_key_for_target("post_id"),
        false,
    )
    .unwrap();

    let post = post
        .with_association(Arc::new(post_author))
        .and_then(|p| p.with_association(Arc::new(post_comments)))
        .and_then(|p| p.with_association(Arc::new(post_tags)))
        .unwrap();
    let author = author.with_association(Arc::new(author_posts)).unwrap();
    let tag = tag.with_association(Arc::new(tag_posts)).unwrap();

    Blog {
        sql,
        docs,
        adapters,
        author,
        post,
        tag,
        comment,
    }
}

pub fn text<'r>(row: &'r Row, field: &str) -> &'r str {
    row.get_by_name(field).and_then(Value::as_str).unwrap_or_default()
}

/// Values of `field` across the rows of a collection relation.
pub fn collect_text(row: &Row, property: &str, field: &str) -> Vec<String> {
    row.relation(property)
        .and_then(Relation::as_many)
        .map(|rows| rows.iter().map(|r| text(r, field).to_string()).collect())
        .unwrap_or_default()
}

pub fn row_with_id<'s>(rows: &'s [Row], id: i64) -> &'s Row {
    rows.iter()
        .find(|r| r.get_by_name("id").and_then(Value::as_i64) == Some(id))
        .expect("row with id")
}
