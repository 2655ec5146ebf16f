//! Schema compilation, validation and casting.
//!
//! A schema starts life as a declarative field template — a record mapping
//! field names to type tags, field descriptors, nested templates or
//! one-element array literals — and is compiled once into an immutable tree
//! of tagged nodes ([`SchemaNode`]). The tree then drives three operations:
//!
//! - [`Schema::validate`] — walks a candidate record against the tree and
//!   fails fast on the first constraint violation.
//! - [`Schema::cast`] — rebuilds a record containing exactly the schema's
//!   declared fields (a structural projection; values are never coerced).
//! - [`Schema::index_paths`] — flattens the tree into the secondary-index
//!   requests handed to the store during provisioning.
//!
//! # Template mini-language
//!
//! ```ignore
//! use bson::doc;
//!
//! let template = doc! {
//!     "name": { "type": "string", "required": true },
//!     "age": { "type": "number", "minValue": [18, "members must be adults"] },
//!     "tags": ["string"],
//!     "profile": { "bio": "string", "links": ["string"] },
//! };
//! let schema = keyform_core::schema::Schema::compile(&template)?;
//! # Ok::<(), keyform_core::error::KeyformError>(())
//! ```

use std::collections::BTreeMap;

use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::{
    error::{KeyformError, KeyformResult},
    store::Record,
};

/// The declared type of a leaf field.
///
/// Declared types are advisory for values (casting never coerces), but they
/// shape the compiled tree: `array` and `object` tags compile to leaves, not
/// containers — containers come from array literals and nested templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl FieldType {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            "date" => Some(FieldType::Date),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }

    /// Returns the template tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// A single constraint attached to a leaf field.
///
/// Validators run in declaration order, `Required` always first. The bound
/// validators carry an optional custom message from the
/// `[threshold, message]` template form.
#[derive(Debug, Clone)]
pub enum Validator {
    /// Fails when the value is absent or falsy (null, `false`, empty string,
    /// numeric zero or NaN).
    Required,
    /// Fails when a string's character count or an array's length is below
    /// the limit. Skipped when the value is absent.
    MinLength { limit: usize, message: Option<String> },
    /// Fails when a string's character count or an array's length exceeds
    /// the limit. Skipped when the value is absent.
    MaxLength { limit: usize, message: Option<String> },
    /// Fails when a numeric value is below the limit. Skipped when the value
    /// is absent.
    MinValue { limit: f64, message: Option<String> },
    /// Fails when a numeric value exceeds the limit. Skipped when the value
    /// is absent.
    MaxValue { limit: f64, message: Option<String> },
}

/// One node of a compiled schema tree. Immutable once compiled.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    /// A terminal field with its declared type, constraints, and uniqueness
    /// marker for index provisioning.
    Leaf {
        field_type: FieldType,
        validators: Vec<Validator>,
        unique: bool,
    },
    /// A nested record, one child node per declared field.
    Object(BTreeMap<String, SchemaNode>),
    /// A homogeneous sequence validated element-by-element.
    Array(Box<SchemaNode>),
}

/// A secondary-index request derived from the schema tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Dotted path of the indexed leaf.
    pub path: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A compiled schema: the root node (always an object) plus the original raw
/// template, retained for persistence and versioning by the external store.
#[derive(Debug, Clone)]
pub struct Schema {
    root: SchemaNode,
    template: Record,
}

impl Schema {
    /// Compiles a field template into an immutable schema tree.
    ///
    /// # Errors
    ///
    /// Returns [`KeyformError::Configuration`] for unknown type tags, array
    /// literals not wrapping exactly one element template, unrecognized
    /// descriptor options, or malformed option values. Compilation is
    /// synchronous and happens before any store work.
    pub fn compile(template: &Record) -> KeyformResult<Self> {
        Ok(Self {
            root: compile_object(template)?,
            template: template.clone(),
        })
    }

    /// The original raw template this schema was compiled from.
    pub fn template(&self) -> &Record {
        &self.template
    }

    /// The compiled root node.
    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Returns whether `field` is declared at the top level of this schema.
    pub fn has_field(&self, field: &str) -> bool {
        match &self.root {
            SchemaNode::Object(children) => children.contains_key(field),
            _ => false,
        }
    }

    /// The top-level declared field names.
    pub fn field_names(&self) -> Vec<&str> {
        match &self.root {
            SchemaNode::Object(children) => children
                .keys()
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Walks the tree against `record`, failing fast on the first violated
    /// constraint.
    ///
    /// Array fields default to an empty sequence when absent; object fields
    /// recurse per child; leaf validators run in declaration order with
    /// `required` first.
    ///
    /// # Errors
    ///
    /// Returns [`KeyformError::Validation`] carrying the dotted path of the
    /// offending field and a human-readable message.
    pub fn validate(&self, record: &Record) -> KeyformResult<()> {
        let SchemaNode::Object(children) = &self.root else {
            return Ok(());
        };
        for (field, child) in children {
            validate_node(child, record.get(field), field)?;
        }
        Ok(())
    }

    /// Rebuilds a new record containing exactly the schema's declared
    /// fields: unknown input fields are dropped, array fields recurse per
    /// element and default to empty, object fields recurse per child, leaf
    /// values are copied through unchanged.
    ///
    /// This is a structural projection, not type coercion — a value of the
    /// wrong runtime type for its declared field passes through as-is.
    /// Declared leaf fields absent from the input are omitted.
    pub fn cast(&self, record: &Record) -> Record {
        let SchemaNode::Object(children) = &self.root else {
            return Record::new();
        };
        let mut projected = Record::new();
        for (field, child) in children {
            if let Some(cast) = cast_node(child, record.get(field)) {
                projected.insert(field.clone(), cast);
            }
        }
        projected
    }

    /// Flattens the tree depth-first into leaf field paths, stopping at
    /// array boundaries, and returns one index request per leaf.
    pub fn index_paths(&self) -> Vec<IndexSpec> {
        let mut specs = Vec::new();
        if let SchemaNode::Object(children) = &self.root {
            for (name, child) in children {
                collect_index_paths(child, name, &mut specs);
            }
        }
        specs
    }
}

fn compile_object(template: &Record) -> KeyformResult<SchemaNode> {
    let mut children = BTreeMap::new();
    for (field, value) in template {
        children.insert(field.clone(), compile_node(value)?);
    }
    Ok(SchemaNode::Object(children))
}

fn compile_node(value: &Bson) -> KeyformResult<SchemaNode> {
    match value {
        Bson::String(tag) => {
            let field_type = FieldType::parse(tag).ok_or_else(|| {
                KeyformError::Configuration(format!("unknown type tag '{tag}' in schema template"))
            })?;
            Ok(SchemaNode::Leaf {
                field_type,
                validators: Vec::new(),
                unique: false,
            })
        }
        Bson::Array(elements) => {
            if elements.len() != 1 {
                return Err(KeyformError::Configuration(format!(
                    "array templates must wrap exactly one element template, got {}",
                    elements.len()
                )));
            }
            Ok(SchemaNode::Array(Box::new(compile_node(&elements[0])?)))
        }
        Bson::Document(map) => {
            // A mapping is a field descriptor only when its `type` entry is
            // a recognized tag; anything else compiles as a nested object.
            match map.get("type") {
                Some(Bson::String(tag)) if FieldType::parse(tag).is_some() => {
                    compile_descriptor(map)
                }
                _ => compile_object(map),
            }
        }
        other => Err(KeyformError::Configuration(format!(
            "unsupported schema template value: {other}"
        ))),
    }
}

fn compile_descriptor(descriptor: &Record) -> KeyformResult<SchemaNode> {
    let tag = descriptor
        .get("type")
        .and_then(Bson::as_str)
        .unwrap_or_default();
    let field_type = FieldType::parse(tag).ok_or_else(|| {
        KeyformError::Configuration(format!("unknown type tag '{tag}' in field descriptor"))
    })?;

    let mut validators = Vec::new();
    let mut unique = false;

    if descriptor
        .get("required")
        .is_some_and(is_truthy)
    {
        validators.push(Validator::Required);
    }

    for (option, value) in descriptor {
        match option.as_str() {
            "type" | "required" => {}
            "unique" => unique = is_truthy(value),
            "minLength" => {
                let (limit, message) = parse_length_bound(option, value)?;
                validators.push(Validator::MinLength { limit, message });
            }
            "maxLength" => {
                let (limit, message) = parse_length_bound(option, value)?;
                validators.push(Validator::MaxLength { limit, message });
            }
            "minValue" => {
                let (limit, message) = parse_value_bound(option, value)?;
                validators.push(Validator::MinValue { limit, message });
            }
            "maxValue" => {
                let (limit, message) = parse_value_bound(option, value)?;
                validators.push(Validator::MaxValue { limit, message });
            }
            other => {
                return Err(KeyformError::Configuration(format!(
                    "unrecognized field option '{other}'"
                )));
            }
        }
    }

    Ok(SchemaNode::Leaf {
        field_type,
        validators,
        unique,
    })
}

/// Parses the bare-or-tupled bound form: a numeric threshold, or a
/// 2-element `[threshold, message]` array.
fn parse_value_bound(option: &str, value: &Bson) -> KeyformResult<(f64, Option<String>)> {
    match value {
        Bson::Array(parts) if parts.len() == 2 => {
            let limit = numeric(&parts[0]).ok_or_else(|| bad_bound(option))?;
            let message = parts[1]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| bad_bound(option))?;
            Ok((limit, Some(message)))
        }
        other => numeric(other)
            .map(|limit| (limit, None))
            .ok_or_else(|| bad_bound(option)),
    }
}

fn parse_length_bound(option: &str, value: &Bson) -> KeyformResult<(usize, Option<String>)> {
    let (limit, message) = parse_value_bound(option, value)?;
    if limit < 0.0 || limit.fract() != 0.0 {
        return Err(bad_bound(option));
    }
    Ok((limit as usize, message))
}

fn bad_bound(option: &str) -> KeyformError {
    KeyformError::Configuration(format!(
        "option '{option}' expects a numeric threshold or a [threshold, message] pair"
    ))
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Falsiness for the `required` validator: absent, null, `false`, the empty
/// string, numeric zero and NaN all count as missing.
fn is_falsy(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) => true,
        Some(Bson::Boolean(b)) => !b,
        Some(Bson::String(s)) => s.is_empty(),
        Some(Bson::Int32(n)) => *n == 0,
        Some(Bson::Int64(n)) => *n == 0,
        Some(Bson::Double(n)) => *n == 0.0 || n.is_nan(),
        Some(_) => false,
    }
}

fn is_truthy(value: &Bson) -> bool {
    !is_falsy(Some(value))
}

fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

fn validate_node(node: &SchemaNode, value: Option<&Bson>, path: &str) -> KeyformResult<()> {
    match node {
        SchemaNode::Leaf { validators, .. } => {
            for validator in validators {
                check_validator(validator, value, path)?;
            }
            Ok(())
        }
        SchemaNode::Object(children) => {
            let map = value.and_then(Bson::as_document);
            for (field, child) in children {
                let child_value = map.and_then(|m| m.get(field));
                validate_node(child, child_value, &join_path(path, field))?;
            }
            Ok(())
        }
        SchemaNode::Array(element) => {
            // A missing array field defaults to an empty sequence, which
            // trivially validates.
            let Some(value) = value else {
                return Ok(());
            };
            let Some(items) = value.as_array() else {
                return Err(KeyformError::Validation {
                    path: path.to_string(),
                    message: "expected an array".to_string(),
                });
            };
            for (index, item) in items.iter().enumerate() {
                validate_node(element, Some(item), &format!("{path}[{index}]"))?;
            }
            Ok(())
        }
    }
}

fn check_validator(validator: &Validator, value: Option<&Bson>, path: &str) -> KeyformResult<()> {
    let fail = |message: String| {
        Err(KeyformError::Validation {
            path: path.to_string(),
            message,
        })
    };

    match validator {
        Validator::Required => {
            if is_falsy(value) {
                return fail("is required".to_string());
            }
        }
        // Bound validators only constrain present values; absence is the
        // `required` validator's concern.
        Validator::MinLength { limit, message } => {
            if let Some(value) = present(value) {
                match length_of(value) {
                    Some(len) if len >= *limit => {}
                    _ => {
                        return fail(message.clone().unwrap_or_else(|| {
                            format!("length must be at least {limit}")
                        }));
                    }
                }
            }
        }
        Validator::MaxLength { limit, message } => {
            if let Some(value) = present(value) {
                match length_of(value) {
                    Some(len) if len <= *limit => {}
                    _ => {
                        return fail(message.clone().unwrap_or_else(|| {
                            format!("length must be at most {limit}")
                        }));
                    }
                }
            }
        }
        Validator::MinValue { limit, message } => {
            if let Some(value) = present(value) {
                match numeric(value) {
                    Some(n) if n >= *limit => {}
                    _ => {
                        return fail(message.clone().unwrap_or_else(|| {
                            format!("must be at least {limit}")
                        }));
                    }
                }
            }
        }
        Validator::MaxValue { limit, message } => {
            if let Some(value) = present(value) {
                match numeric(value) {
                    Some(n) if n <= *limit => {}
                    _ => {
                        return fail(message.clone().unwrap_or_else(|| {
                            format!("must be at most {limit}")
                        }));
                    }
                }
            }
        }
    }

    Ok(())
}

fn present(value: Option<&Bson>) -> Option<&Bson> {
    match value {
        Some(Bson::Null) | None => None,
        Some(value) => Some(value),
    }
}

fn length_of(value: &Bson) -> Option<usize> {
    match value {
        Bson::String(s) => Some(s.chars().count()),
        Bson::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn cast_node(node: &SchemaNode, value: Option<&Bson>) -> Option<Bson> {
    match node {
        SchemaNode::Leaf { .. } => value.cloned(),
        SchemaNode::Object(children) => {
            let map = value.and_then(Bson::as_document);
            let mut projected = Record::new();
            for (field, child) in children {
                let child_value = map.and_then(|m| m.get(field));
                if let Some(cast) = cast_node(child, child_value) {
                    projected.insert(field.clone(), cast);
                }
            }
            Some(Bson::Document(projected))
        }
        SchemaNode::Array(element) => {
            let items = value
                .and_then(Bson::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| cast_node(element, Some(item)))
                        .collect()
                })
                .unwrap_or_default();
            Some(Bson::Array(items))
        }
    }
}

fn collect_index_paths(node: &SchemaNode, path: &str, specs: &mut Vec<IndexSpec>) {
    match node {
        SchemaNode::Leaf { unique, .. } => specs.push(IndexSpec {
            path: path.to_string(),
            unique: *unique,
        }),
        // Flattening stops at array boundaries: the array field itself is
        // the indexed leaf.
        SchemaNode::Array(_) => specs.push(IndexSpec {
            path: path.to_string(),
            unique: false,
        }),
        SchemaNode::Object(children) => {
            for (field, child) in children {
                collect_index_paths(child, &join_path(path, field), specs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn schema(template: Record) -> Schema {
        Schema::compile(&template).expect("template should compile")
    }

    #[test]
    fn compiles_tags_descriptors_arrays_and_nested_objects() {
        let schema = schema(doc! {
            "name": "string",
            "age": { "type": "number", "required": true, "minValue": 18 },
            "tags": ["string"],
            "profile": { "bio": "string" },
        });

        assert!(schema.has_field("name"));
        assert!(schema.has_field("profile"));
        assert!(!schema.has_field("missing"));

        let SchemaNode::Object(children) = schema.root() else {
            panic!("root must be an object");
        };
        assert!(matches!(children.get("tags"), Some(SchemaNode::Array(_))));
        assert!(matches!(
            children.get("profile"),
            Some(SchemaNode::Object(_))
        ));
        match children.get("age") {
            Some(SchemaNode::Leaf { validators, .. }) => {
                assert!(matches!(validators[0], Validator::Required));
                assert!(matches!(validators[1], Validator::MinValue { .. }));
            }
            other => panic!("age should be a leaf, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_tags_and_options() {
        assert!(matches!(
            Schema::compile(&doc! { "name": "str" }),
            Err(KeyformError::Configuration(_))
        ));
        assert!(matches!(
            Schema::compile(&doc! { "name": { "type": "string", "pattern": ".*" } }),
            Err(KeyformError::Configuration(_))
        ));
        assert!(matches!(
            Schema::compile(&doc! { "tags": ["string", "number"] }),
            Err(KeyformError::Configuration(_))
        ));
    }

    #[test]
    fn validates_a_conforming_record() {
        let schema = schema(doc! {
            "name": { "type": "string", "required": true, "minLength": 2 },
            "age": { "type": "number", "minValue": 18, "maxValue": 120 },
            "tags": ["string"],
        });

        schema
            .validate(&doc! { "name": "Ann", "age": 32, "tags": ["a", "b"] })
            .expect("conforming record should validate");
        // Missing array fields default to an empty sequence.
        schema
            .validate(&doc! { "name": "Ann", "age": 32 })
            .expect("missing array should default to empty");
    }

    #[test]
    fn validation_names_the_offending_field() {
        let schema = schema(doc! {
            "name": "string",
            "age": { "type": "number", "minValue": 18 },
        });

        let err = schema
            .validate(&doc! { "name": "Ann", "age": 15 })
            .expect_err("minValue violation");
        match err {
            KeyformError::Validation { path, .. } => assert_eq!(path, "age"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn required_rejects_falsy_values() {
        let schema = schema(doc! { "name": { "type": "string", "required": true } });

        for record in [
            doc! {},
            doc! { "name": Bson::Null },
            doc! { "name": "" },
            doc! { "name": false },
            doc! { "name": 0 },
        ] {
            assert!(
                matches!(
                    schema.validate(&record),
                    Err(KeyformError::Validation { .. })
                ),
                "{record} should fail required"
            );
        }
        schema
            .validate(&doc! { "name": "x" })
            .expect("present value should pass");
    }

    #[test]
    fn custom_bound_messages_surface() {
        let schema = schema(doc! {
            "age": { "type": "number", "minValue": [18, "members must be adults"] },
        });

        let err = schema
            .validate(&doc! { "age": 15 })
            .expect_err("bound violated");
        match err {
            KeyformError::Validation { message, .. } => {
                assert_eq!(message, "members must be adults")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn nested_paths_are_dotted_and_array_elements_indexed() {
        let schema = schema(doc! {
            "profile": { "bio": { "type": "string", "minLength": 4 } },
            "tags": [{ "type": "string", "minLength": 2 }],
        });

        let err = schema
            .validate(&doc! { "profile": { "bio": "hi" } })
            .expect_err("nested minLength violation");
        match err {
            KeyformError::Validation { path, .. } => assert_eq!(path, "profile.bio"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let err = schema
            .validate(&doc! { "tags": ["ok", "x"] })
            .expect_err("element minLength violation");
        match err {
            KeyformError::Validation { path, .. } => assert_eq!(path, "tags[1]"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn cast_is_a_structural_projection() {
        let schema = schema(doc! {
            "name": "string",
            "age": "number",
            "tags": ["string"],
            "profile": { "bio": "string" },
        });

        let cast = schema.cast(&doc! {
            "name": "Ann",
            "extra": "dropped",
            "profile": { "bio": "hi", "stray": 1 },
        });

        assert_eq!(cast.get("name"), Some(&Bson::String("Ann".into())));
        assert!(cast.get("extra").is_none());
        // Missing arrays become empty sequences; missing leaves are omitted.
        assert_eq!(cast.get("tags"), Some(&Bson::Array(vec![])));
        assert!(cast.get("age").is_none());
        match cast.get("profile") {
            Some(Bson::Document(profile)) => assert!(profile.get("stray").is_none()),
            other => panic!("declared object should materialize, got {other:?}"),
        }
    }

    #[test]
    fn cast_does_not_coerce_types() {
        let schema = schema(doc! { "age": "number" });
        let cast = schema.cast(&doc! { "age": "not a number" });
        assert_eq!(cast.get("age"), Some(&Bson::String("not a number".into())));
    }

    #[test]
    fn index_paths_flatten_to_leaves_and_stop_at_arrays() {
        let schema = schema(doc! {
            "email": { "type": "string", "unique": true },
            "profile": { "bio": "string", "links": ["string"] },
        });

        let mut specs = schema.index_paths();
        specs.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            specs,
            vec![
                IndexSpec { path: "email".into(), unique: true },
                IndexSpec { path: "profile.bio".into(), unique: false },
                IndexSpec { path: "profile.links".into(), unique: false },
            ]
        );
    }
}
