/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Dictionary construction from QuickFIX-style XML schema files.
//!
//! Loading runs in passes: read the XML into a lightweight node tree, index
//! the `<fields>` section, resolve `<components>` (validate references,
//! build the reference graph, topologically sort it, reject cycles,
//! materialize each component as a spec), then build header, trailer and
//! per-message body specs with components merged inline.

use crate::schema::{Dictionary, FieldDef, FieldType, GroupSpec};
use quick_xml::events::Event;
use quick_xml::Reader;
use rapidfix_core::error::DictionaryError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

/// A parsed XML element: name, attributes and child elements.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Mutable spec under construction; frozen into [`GroupSpec`] at the end.
#[derive(Debug, Clone, Default)]
struct SpecBuilder {
    fields: HashMap<u32, bool>,
    groups: HashMap<u32, SpecBuilder>,
    order: Vec<u32>,
    ordered: bool,
}

impl SpecBuilder {
    fn add_field(&mut self, tag: u32, required: bool, context: &str) -> Result<(), DictionaryError> {
        if self.fields.insert(tag, required).is_some() || self.groups.contains_key(&tag) {
            return Err(DictionaryError::DuplicateReference {
                name: tag.to_string(),
                context: context.to_string(),
            });
        }
        self.order.push(tag);
        Ok(())
    }

    fn add_group(
        &mut self,
        tag: u32,
        spec: SpecBuilder,
        context: &str,
    ) -> Result<(), DictionaryError> {
        if self.groups.insert(tag, spec).is_some() || self.fields.contains_key(&tag) {
            return Err(DictionaryError::DuplicateReference {
                name: tag.to_string(),
                context: context.to_string(),
            });
        }
        self.order.push(tag);
        Ok(())
    }

    /// Merges a materialized component into this spec in its declared order.
    fn merge(&mut self, component: &SpecBuilder, context: &str) -> Result<(), DictionaryError> {
        for &tag in &component.order {
            if let Some(required) = component.fields.get(&tag) {
                self.add_field(tag, *required, context)?;
            } else if let Some(group) = component.groups.get(&tag) {
                self.add_group(tag, group.clone(), context)?;
            }
        }
        Ok(())
    }

    /// Freezes into an immutable [`GroupSpec`], pairing each DATA field with
    /// its nearest preceding LENGTH field.
    fn freeze(self, fields: &HashMap<u32, FieldDef>) -> GroupSpec {
        let mut data_length = HashMap::new();
        let mut last_length: Option<u32> = None;
        for &tag in &self.order {
            match fields.get(&tag).map(|d| d.kind) {
                Some(FieldType::Length) => last_length = Some(tag),
                Some(FieldType::Data) => {
                    if let Some(len_tag) = last_length {
                        data_length.insert(tag, len_tag);
                    }
                }
                _ => {}
            }
        }

        let groups = self
            .groups
            .into_iter()
            .map(|(tag, builder)| (tag, builder.freeze(fields)))
            .collect();

        GroupSpec::new(self.fields, groups, self.order, self.ordered, data_length)
    }
}

impl Dictionary {
    /// Loads a dictionary from a schema file.
    ///
    /// # Errors
    /// Returns [`DictionaryError`] on unreadable files, malformed XML or any
    /// semantic violation. All load errors are fatal at process start.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading FIX dictionary");
        let text = std::fs::read_to_string(path)
            .map_err(|e| DictionaryError::Unreadable(format!("{}: {e}", path.display())))?;
        Self::from_xml(&text)
    }

    /// Builds a dictionary from schema XML text.
    ///
    /// # Errors
    /// See [`Dictionary::load`].
    pub fn from_xml(text: &str) -> Result<Self, DictionaryError> {
        let root = read_tree(text)?;
        let root = if root.name == "fix" {
            root
        } else {
            return Err(DictionaryError::MissingSection { section: "fix" });
        };

        let mut dict = Dictionary::default();

        // Field definitions first; everything else references them by name.
        let fields_node = root
            .child("fields")
            .ok_or(DictionaryError::MissingSection { section: "fields" })?;
        for field in &fields_node.children {
            if field.name != "field" {
                continue;
            }
            let tag: u32 = field
                .attr("number")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| DictionaryError::InvalidField {
                    reason: "field definition missing numeric 'number'".to_string(),
                })?;
            let name = field
                .attr("name")
                .filter(|n| !n.is_empty())
                .ok_or_else(|| DictionaryError::InvalidField {
                    reason: format!("field {tag} missing 'name'"),
                })?;
            let kind: FieldType = field
                .attr("type")
                .ok_or_else(|| DictionaryError::InvalidField {
                    reason: format!("field {name} missing 'type'"),
                })?
                .parse()?;

            if dict.fields.contains_key(&tag) {
                return Err(DictionaryError::InvalidField {
                    reason: format!("multiple definitions for tag {tag}"),
                });
            }
            dict.by_name.insert(name.to_string(), tag);
            dict.fields.insert(
                tag,
                FieldDef {
                    name: name.to_string(),
                    kind,
                },
            );
        }

        let components = resolve_components(&root, &dict)?;

        let header_node = root
            .child("header")
            .ok_or(DictionaryError::MissingSection { section: "header" })?;
        let trailer_node = root
            .child("trailer")
            .ok_or(DictionaryError::MissingSection { section: "trailer" })?;

        dict.header = build_spec(header_node, &dict, &components, "header")?.freeze(&dict.fields);
        dict.trailer = build_spec(trailer_node, &dict, &components, "trailer")?.freeze(&dict.fields);

        let messages_node = root
            .child("messages")
            .ok_or(DictionaryError::MissingSection { section: "messages" })?;
        for message in &messages_node.children {
            if message.name != "message" {
                continue;
            }
            let msg_type = message
                .attr("msgtype")
                .filter(|m| !m.is_empty())
                .ok_or_else(|| DictionaryError::InvalidField {
                    reason: "message definition missing 'msgtype'".to_string(),
                })?;
            if dict.bodies.contains_key(msg_type) {
                return Err(DictionaryError::DuplicateMessage {
                    msg_type: msg_type.to_string(),
                });
            }
            let spec = build_spec(message, &dict, &components, msg_type)?.freeze(&dict.fields);
            dict.bodies.insert(msg_type.to_string(), spec);
        }

        tracing::info!(
            fields = dict.fields.len(),
            messages = dict.bodies.len(),
            "FIX dictionary loaded"
        );
        Ok(dict)
    }
}

/// Reads the XML document into a node tree. Text content is discarded; only
/// element structure and attributes carry schema meaning.
fn read_tree(text: &str) -> Result<XmlNode, DictionaryError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = vec![XmlNode::default()];

    let into_node = |e: &quick_xml::events::BytesStart<'_>| -> Result<XmlNode, DictionaryError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| DictionaryError::Unreadable(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DictionaryError::Unreadable(e.to_string()))?
                .into_owned();
            attrs.insert(key, value);
        }
        Ok(XmlNode {
            name,
            attrs,
            children: Vec::new(),
        })
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(into_node(&e)?),
            Ok(Event::Empty(e)) => {
                let node = into_node(&e)?;
                stack
                    .last_mut()
                    .expect("root frame always present")
                    .children
                    .push(node);
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().expect("balanced by quick-xml");
                stack
                    .last_mut()
                    .ok_or_else(|| DictionaryError::Unreadable("unbalanced element".to_string()))?
                    .children
                    .push(node);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DictionaryError::Unreadable(e.to_string())),
        }
    }

    let mut root = stack.pop().ok_or_else(|| {
        DictionaryError::Unreadable("empty document".to_string())
    })?;
    if !stack.is_empty() {
        return Err(DictionaryError::Unreadable(
            "unterminated element".to_string(),
        ));
    }
    root.children
        .pop()
        .ok_or_else(|| DictionaryError::Unreadable("empty document".to_string()))
}

/// Validates component references, topologically sorts the reference graph
/// and materializes every component as a spec builder.
fn resolve_components(
    root: &XmlNode,
    dict: &Dictionary,
) -> Result<HashMap<String, SpecBuilder>, DictionaryError> {
    let mut nodes: HashMap<String, &XmlNode> = HashMap::new();
    let mut graph: HashMap<String, HashSet<String>> = HashMap::new();

    if let Some(components) = root.child("components") {
        for component in &components.children {
            if component.name != "component" {
                continue;
            }
            let name = component
                .attr("name")
                .filter(|n| !n.is_empty())
                .ok_or_else(|| DictionaryError::InvalidField {
                    reason: "component definition missing 'name'".to_string(),
                })?;
            if nodes.insert(name.to_string(), component).is_some() {
                return Err(DictionaryError::DuplicateReference {
                    name: name.to_string(),
                    context: "components".to_string(),
                });
            }
            graph.insert(name.to_string(), HashSet::new());
        }

        for (name, node) in &nodes {
            collect_references(node, name, dict, &nodes, &mut graph)?;
        }
    }

    // Kahn's algorithm over "depends on" edges: a component is materialized
    // only after everything it references.
    let mut indegree: HashMap<&str, usize> =
        graph.keys().map(|k| (k.as_str(), 0)).collect();
    for deps in graph.values() {
        for dep in deps {
            *indegree.entry(dep.as_str()).or_insert(0) += 1;
        }
    }
    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut sorted: Vec<&str> = Vec::new();
    while let Some(name) = queue.pop_front() {
        sorted.push(name);
        if let Some(deps) = graph.get(name) {
            for dep in deps {
                let d = indegree.get_mut(dep.as_str()).expect("edge target known");
                *d -= 1;
                if *d == 0 {
                    queue.push_back(dep.as_str());
                }
            }
        }
    }
    if sorted.len() != graph.len() {
        let on_cycle = graph
            .keys()
            .find(|k| !sorted.contains(&k.as_str()))
            .cloned()
            .unwrap_or_default();
        return Err(DictionaryError::ComponentCycle { name: on_cycle });
    }

    // Dependencies come after their dependents in the sort above, so build
    // in reverse order.
    let mut materialized: HashMap<String, SpecBuilder> = HashMap::new();
    for name in sorted.into_iter().rev() {
        let node = nodes[name];
        let spec = build_spec(node, dict, &materialized, name)?;
        materialized.insert(name.to_string(), spec);
    }

    Ok(materialized)
}

/// Records component-to-component references (including those nested inside
/// groups) and validates that every referenced name exists.
fn collect_references(
    node: &XmlNode,
    owner: &str,
    dict: &Dictionary,
    components: &HashMap<String, &XmlNode>,
    graph: &mut HashMap<String, HashSet<String>>,
) -> Result<(), DictionaryError> {
    for child in &node.children {
        match child.name.as_str() {
            "component" => {
                let name = child.attr("name").filter(|n| !n.is_empty()).ok_or_else(|| {
                    DictionaryError::InvalidField {
                        reason: format!("component reference in {owner} missing 'name'"),
                    }
                })?;
                if !components.contains_key(name) {
                    return Err(DictionaryError::UndefinedReference {
                        kind: "component",
                        name: name.to_string(),
                    });
                }
                graph
                    .get_mut(owner)
                    .expect("owner registered before traversal")
                    .insert(name.to_string());
            }
            "group" => {
                let name = child.attr("name").filter(|n| !n.is_empty()).ok_or_else(|| {
                    DictionaryError::InvalidField {
                        reason: format!("group reference in {owner} missing 'name'"),
                    }
                })?;
                if dict.field_tag(name).is_none() {
                    return Err(DictionaryError::UndefinedReference {
                        kind: "group",
                        name: name.to_string(),
                    });
                }
                collect_references(child, owner, dict, components, graph)?;
            }
            "field" => {
                let name = child.attr("name").filter(|n| !n.is_empty()).ok_or_else(|| {
                    DictionaryError::InvalidField {
                        reason: format!("field reference in {owner} missing 'name'"),
                    }
                })?;
                if dict.field_tag(name).is_none() {
                    return Err(DictionaryError::UndefinedReference {
                        kind: "field",
                        name: name.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Builds a spec from an element's children, merging referenced components
/// inline in declaration order.
fn build_spec(
    node: &XmlNode,
    dict: &Dictionary,
    components: &HashMap<String, SpecBuilder>,
    context: &str,
) -> Result<SpecBuilder, DictionaryError> {
    let mut spec = SpecBuilder {
        ordered: node.attr("ordered").map_or(true, |v| v != "N"),
        ..SpecBuilder::default()
    };

    for child in &node.children {
        match child.name.as_str() {
            "field" => {
                let name = child.attr("name").unwrap_or_default();
                let tag = dict
                    .field_tag(name)
                    .ok_or_else(|| DictionaryError::UndefinedReference {
                        kind: "field",
                        name: name.to_string(),
                    })?;
                let required = child.attr("required") == Some("Y");
                spec.add_field(tag, required, context)?;
            }
            "group" => {
                let name = child.attr("name").unwrap_or_default();
                let tag = dict
                    .field_tag(name)
                    .ok_or_else(|| DictionaryError::UndefinedReference {
                        kind: "group",
                        name: name.to_string(),
                    })?;
                let inner = build_spec(child, dict, components, name)?;
                spec.add_group(tag, inner, context)?;
            }
            "component" => {
                let name = child.attr("name").unwrap_or_default();
                let component =
                    components
                        .get(name)
                        .ok_or_else(|| DictionaryError::UndefinedReference {
                            kind: "component",
                            name: name.to_string(),
                        })?;
                spec.merge(component, context)?;
            }
            _ => {}
        }
    }

    Ok(spec)
}
