//! Response parsing and failure classification

use super::types::{FieldDeclaration, QueryPage, Session};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, RawEntityRecord};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// ============================================================================
// XML Tree
// ============================================================================

/// Minimal element tree built from a response document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::malformed(format!("bad attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::malformed(format!("bad attribute value: {e}")))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of direct children
    pub fn path(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// First descendant (depth-first) with the given name
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find_map(|c| {
            if c.name == name {
                Some(c)
            } else {
                c.descendant(name)
            }
        })
    }

    /// Trimmed text of the element, `None` when blank
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Trimmed text at a child path
    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.path(path).and_then(XmlNode::text)
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Convert to a JSON value: leaves become trimmed strings, repeated
    /// sibling tags become arrays
    pub fn to_value(&self) -> JsonValue {
        if self.children.is_empty() {
            return JsonValue::String(self.text.trim().to_string());
        }

        let mut map = JsonObject::new();
        for child in &self.children {
            let value = child.to_value();
            match map.get_mut(&child.name) {
                Some(JsonValue::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = JsonValue::Array(vec![first, value]);
                }
                None => {
                    map.insert(child.name.clone(), value);
                }
            }
        }
        JsonValue::Object(map)
    }
}

/// Parse an XML document into a tree
pub fn parse_document(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::malformed(format!("invalid XML: {e}")))?;
        match event {
            Event::Start(e) => stack.push(XmlNode::from_start(&e)?),
            Event::Empty(e) => {
                let node = XmlNode::from_start(&e)?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::malformed("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, node);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::malformed(format!("invalid text: {e}")))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::malformed("document ended inside an element"));
    }
    root.ok_or_else(|| Error::malformed("empty document"))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

// ============================================================================
// Gateway Response
// ============================================================================

/// A successfully parsed, status-checked gateway response
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    root: XmlNode,
}

impl GatewayResponse {
    /// Parse a response body and raise typed errors for reported failures
    pub fn parse(body: &str) -> Result<Self> {
        let root = parse_document(body)?;
        if root.name != "response" {
            return Err(Error::malformed(format!(
                "expected <response>, got <{}>",
                root.name
            )));
        }
        check_failures(&root)?;
        Ok(Self { root })
    }

    /// The first operation result
    pub fn result(&self) -> Result<&XmlNode> {
        self.root
            .path("operation/result")
            .ok_or_else(|| Error::malformed("response has no operation result"))
    }

    /// The result's `<data>` element
    pub fn data(&self) -> Result<&XmlNode> {
        self.result()?
            .child("data")
            .ok_or_else(|| Error::malformed("result has no data element"))
    }

    /// Entity records under `<data>`
    pub fn records(&self) -> Result<Vec<RawEntityRecord>> {
        let data = self.data()?;
        let records = data
            .children
            .iter()
            .filter(|c| c.name != "error" && c.name != "warnings")
            .map(|c| match c.to_value() {
                JsonValue::Object(map) => map,
                scalar => {
                    let mut map = JsonObject::new();
                    map.insert(c.name.clone(), scalar);
                    map
                }
            })
            .collect();
        Ok(records)
    }

    /// Records plus the total result size
    pub fn query_page(&self) -> Result<QueryPage> {
        let data = self.data()?;
        let records = self.records()?;

        let total_count = match count_field(data, "totalcount")? {
            Some(total) => total,
            None => {
                let remaining = count_field(data, "numremaining")?.ok_or_else(|| {
                    Error::malformed("query result has neither totalcount nor numremaining")
                })?;
                let offset = count_field(data, "offset")?.unwrap_or(0);
                let count = count_field(data, "count")?.unwrap_or(records.len() as u64);
                offset
                    .checked_add(count)
                    .and_then(|n| n.checked_add(remaining))
                    .ok_or_else(|| {
                        Error::malformed(format!(
                            "result size overflows: offset {offset}, count {count}, remaining {remaining}"
                        ))
                    })?
            }
        };

        Ok(QueryPage {
            records,
            total_count,
        })
    }

    /// Session issued by `getAPISession`
    pub fn session(&self, default_endpoint: &str) -> Result<Session> {
        let api = self
            .data()?
            .child("api")
            .ok_or_else(|| Error::malformed("session result has no api element"))?;
        let id = api
            .text_at("sessionid")
            .ok_or_else(|| Error::malformed("session result has no sessionid"))?;
        Ok(Session {
            id: id.to_string(),
            endpoint: api
                .text_at("endpoint")
                .unwrap_or(default_endpoint)
                .to_string(),
        })
    }
}

/// Numeric count from a `<data>` attribute or child element
fn count_field(data: &XmlNode, name: &str) -> Result<Option<u64>> {
    let Some(raw) = data.attr(name).or_else(|| data.text_at(name)) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| Error::malformed(format!("{name} is not a count: {raw}")))
}

fn is_failure(status: Option<&str>) -> bool {
    status.is_some_and(|s| !s.eq_ignore_ascii_case("success"))
}

fn error_description(node: &XmlNode) -> Option<String> {
    node.descendant("description2")
        .and_then(XmlNode::text)
        .or_else(|| node.descendant("description").and_then(XmlNode::text))
        .map(ToString::to_string)
}

fn check_failures(root: &XmlNode) -> Result<()> {
    if is_failure(root.text_at("control/status")) {
        let message = error_description(root).unwrap_or_else(|| "Control failure".to_string());
        let error_no = root
            .descendant("errorno")
            .and_then(XmlNode::text)
            .map(ToString::to_string);
        return Err(classify_failure(message, error_no));
    }

    if let Some(auth) = root.path("operation/authentication") {
        if is_failure(auth.text_at("status")) {
            // The error block is a sibling of <authentication>
            let message = error_description(auth)
                .or_else(|| root.child("operation").and_then(error_description))
                .unwrap_or_else(|| "Authentication failure".to_string());
            return Err(Error::auth(message));
        }
    }

    if let Some(operation) = root.child("operation") {
        for result in operation.children_named("result") {
            if !is_failure(result.text_at("status")) {
                continue;
            }
            let message =
                error_description(result).unwrap_or_else(|| "Operation failure".to_string());
            let error_no = result
                .descendant("errorno")
                .and_then(XmlNode::text)
                .map(ToString::to_string);
            return Err(classify_failure(message, error_no));
        }
    }

    Ok(())
}

/// Map a reported failure onto an error kind by message and error number
pub fn classify_failure(message: String, error_no: Option<String>) -> Error {
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || error_no.as_deref() == Some("WSP001") {
        Error::permission(message)
    } else if lowered.contains("timeout") || lowered.contains("temporarily unavailable") {
        Error::transient(message)
    } else if lowered.contains("login") || lowered.contains("authentication") {
        Error::auth(message)
    } else {
        Error::gateway(message, error_no)
    }
}

/// Field declarations from a `lookup` record
pub fn field_declarations(record: &RawEntityRecord) -> Vec<FieldDeclaration> {
    let fields = record
        .get("Fields")
        .and_then(|f| f.get("Field"))
        .cloned()
        .unwrap_or(JsonValue::Null);

    let items = match fields {
        JsonValue::Array(items) => items,
        JsonValue::Object(_) => vec![fields],
        _ => Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let text = |key: &str| {
                item.get(key)
                    .and_then(JsonValue::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
            };
            let name = text("ID").or_else(|| text("NAME"))?;
            Some(FieldDeclaration {
                name,
                datatype: text("DATATYPE").or_else(|| text("TYPE")),
            })
        })
        .collect()
}
