//! Request envelope serialization
//!
//! Every call is a `<request>` with a `<control>` block carrying the sender
//! credentials, and an `<operation>` with either a login or a session id
//! followed by exactly one `<function>`.

use super::types::{Credentials, Filter, QueryRequest};
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// How the operation authenticates
#[derive(Debug, Clone, Copy)]
pub enum Authentication<'a> {
    /// Full login, optionally scoped to an entity
    Login { entity_id: Option<&'a str> },
    /// Previously issued session id
    Session(&'a str),
}

/// A gateway function call
#[derive(Debug, Clone)]
pub enum Function {
    /// Issue a session for the login's entity
    GetApiSession,
    /// Paged query with explicit field list
    Query {
        request: QueryRequest,
        fields: Vec<String>,
    },
    /// Object definition lookup
    Lookup { object: String },
    /// List the company's entities
    ReadEntityDetails,
}

impl Function {
    /// Gateway function name
    pub fn name(&self) -> &'static str {
        match self {
            Function::GetApiSession => "getAPISession",
            Function::Query { .. } => "query",
            Function::Lookup { .. } => "lookup",
            Function::ReadEntityDetails => "readEntityDetails",
        }
    }
}

/// Serialize a full request envelope
pub fn build_request(
    credentials: &Credentials,
    auth: Authentication<'_>,
    function: &Function,
) -> Result<String> {
    let mut xml = XmlBuilder::new();
    xml.declaration()?;
    xml.start("request")?;

    xml.start("control")?;
    xml.text_element("senderid", &credentials.sender_id)?;
    xml.text_element("password", &credentials.sender_password)?;
    xml.text_element("controlid", &new_control_id())?;
    xml.text_element("uniqueid", "false")?;
    xml.text_element("dtdversion", "3.0")?;
    xml.text_element("includewhitespace", "false")?;
    xml.end("control")?;

    xml.start("operation")?;
    xml.start("authentication")?;
    match auth {
        Authentication::Login { entity_id } => {
            xml.start("login")?;
            xml.text_element("userid", &credentials.user_id)?;
            xml.text_element("companyid", &credentials.company_id)?;
            xml.text_element("password", &credentials.user_password)?;
            if let Some(entity) = entity_id {
                xml.text_element("locationid", entity)?;
            }
            xml.end("login")?;
        }
        Authentication::Session(session_id) => {
            xml.text_element("sessionid", session_id)?;
        }
    }
    xml.end("authentication")?;

    xml.start("content")?;
    xml.start_with_attr("function", "controlid", &new_control_id())?;
    write_function(&mut xml, function)?;
    xml.end("function")?;
    xml.end("content")?;
    xml.end("operation")?;

    xml.end("request")?;
    xml.finish()
}

fn write_function(xml: &mut XmlBuilder, function: &Function) -> Result<()> {
    match function {
        Function::GetApiSession => xml.empty("getAPISession"),
        Function::ReadEntityDetails => xml.empty("readEntityDetails"),
        Function::Lookup { object } => {
            xml.start("lookup")?;
            xml.text_element("object", object)?;
            xml.end("lookup")
        }
        Function::Query { request, fields } => {
            xml.start("query")?;
            xml.text_element("object", &request.object)?;
            xml.start("select")?;
            for field in fields {
                xml.text_element("field", field)?;
            }
            xml.end("select")?;
            if let Some(filter) = &request.filter {
                xml.start("filter")?;
                write_filter(xml, filter)?;
                xml.end("filter")?;
            }
            if let Some(order_by) = &request.order_by {
                xml.start("orderby")?;
                xml.start("order")?;
                xml.text_element("field", order_by)?;
                xml.empty("ascending")?;
                xml.end("order")?;
                xml.end("orderby")?;
            }
            xml.text_element("pagesize", &request.page_size.to_string())?;
            xml.text_element("offset", &request.offset.to_string())?;
            xml.end("query")
        }
    }
}

fn write_filter(xml: &mut XmlBuilder, filter: &Filter) -> Result<()> {
    let tag = filter.operator_tag();
    match filter {
        Filter::And(inner) => {
            xml.start(tag)?;
            for f in inner {
                write_filter(xml, f)?;
            }
            xml.end(tag)
        }
        Filter::Equal { field, value }
        | Filter::GreaterThanOrEqual { field, value }
        | Filter::LessThan { field, value } => {
            xml.start(tag)?;
            xml.text_element("field", field)?;
            xml.text_element("value", value)?;
            xml.end(tag)
        }
    }
}

fn new_control_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Other(format!("Failed to write request envelope: {e}"))
}

/// Thin wrapper over the quick-xml writer
struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl XmlBuilder {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn declaration(&mut self) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)
    }

    fn start(&mut self, tag: &str) -> Result<()> {
        self.writer
            .write_event(Event::Start(BytesStart::new(tag)))
            .map_err(xml_error)
    }

    fn start_with_attr(&mut self, tag: &str, key: &str, value: &str) -> Result<()> {
        let element = BytesStart::new(tag).with_attributes([(key, value)]);
        self.writer
            .write_event(Event::Start(element))
            .map_err(xml_error)
    }

    fn end(&mut self, tag: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_error)
    }

    fn empty(&mut self, tag: &str) -> Result<()> {
        self.writer
            .write_event(Event::Empty(BytesStart::new(tag)))
            .map_err(xml_error)
    }

    fn text_element(&mut self, tag: &str, text: &str) -> Result<()> {
        self.start(tag)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
        self.end(tag)
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(xml_error)
    }
}
