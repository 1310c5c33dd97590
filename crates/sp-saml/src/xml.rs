//! Minimal namespace-aware XML element tree.
//!
//! SAML processing needs three things from XML: typed access to elements by
//! namespace and local name, the exclusive canonical form of any subtree for
//! signatures, and the ability to splice decrypted fragments back into a
//! document. This module provides that on top of `quick-xml` and
//! `xml_canonicalization`.
//!
//! Character data is kept the way `lxml` keeps it: `text` holds the content
//! before the first child and each child's `tail` the content after its end
//! tag. Comments and processing instructions are dropped. DOCTYPE
//! declarations are rejected.

use std::collections::HashMap;
use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use xml_canonicalization::Canonicalizer;

use crate::error::{SamlError, SamlResult};
use crate::types::{SAMLP_NS, SAML_NS, XMLDSIG_NS, XMLENC_NS};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Prefixes resolved when a fragment uses them without declaring them.
const WELL_KNOWN_PREFIXES: [(&str, &str); 6] = [
    ("saml", SAML_NS),
    ("samlp", SAMLP_NS),
    ("ds", XMLDSIG_NS),
    ("xenc", XMLENC_NS),
    ("xsi", XSI_NS),
    ("xs", XS_NS),
];

/// An XML element with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct XmlElement {
    /// Prefix as written in the document.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Attributes in document order, with qualified names as written.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Character data before the first child.
    pub text: String,
    /// Character data between this element's end tag and the next sibling.
    #[serde(default)]
    pub tail: String,
    /// Namespace bindings in scope from ancestors and not redeclared here,
    /// sorted by prefix. Recorded on parse so that a subtree can be
    /// canonicalized on its own.
    #[serde(default)]
    pub inherited_namespaces: Vec<(String, String)>,
}

impl XmlElement {
    /// Creates an element with a prefix and namespace.
    #[must_use]
    pub fn new(prefix: &str, name: &str, namespace: &str) -> Self {
        Self {
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            ..Self::default()
        }
    }

    /// Parses a document and returns its root element.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut scopes: Vec<HashMap<String, String>> = vec![HashMap::new()];
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = open_element(&start, &mut scopes)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = open_element(&start, &mut scopes)?;
                    scopes.pop();
                    close_element(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    scopes.pop();
                    close_element(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    match stack.last_mut() {
                        Some(top) => top.push_character_data(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(SamlError::XmlParse(
                                "text outside of the root element".to_string(),
                            ))
                        }
                    }
                }
                Event::CData(data) => {
                    let data = std::str::from_utf8(&data)
                        .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8 in CDATA: {e}")))?;
                    if let Some(top) = stack.last_mut() {
                        top.push_character_data(data);
                    }
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(SamlError::XmlParse("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
    }

    /// Returns the qualified name (`prefix:name` or `name`).
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Returns `true` if this element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns an attribute value by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Builder form of [`XmlElement::set_attr`].
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Declares a namespace prefix on this element.
    #[must_use]
    pub fn with_namespace(self, prefix: &str, uri: &str) -> Self {
        self.with_attr(&format!("xmlns:{prefix}"), uri)
    }

    /// Sets the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Returns the first child with the given namespace and local name.
    #[must_use]
    pub fn child(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// Returns all children with the given namespace and local name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }

    /// Returns the trimmed text of the first matching child.
    #[must_use]
    pub fn child_text(&self, namespace: &str, name: &str) -> Option<&str> {
        self.child(namespace, name).map(|c| c.text.trim())
    }

    /// Returns the index of the first matching child.
    #[must_use]
    pub fn position(&self, namespace: &str, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.is(namespace, name))
    }

    /// Returns a copy of this element without its direct children matching
    /// the given name. Character data around a removed child is kept.
    #[must_use]
    pub fn without_children(&self, namespace: &str, name: &str) -> Self {
        let mut copy = self.clone();
        let children = std::mem::take(&mut copy.children);
        for child in children {
            if child.is(namespace, name) {
                match copy.children.last_mut() {
                    Some(previous) => previous.tail.push_str(&child.tail),
                    None => copy.text.push_str(&child.tail),
                }
            } else {
                copy.children.push(child);
            }
        }
        copy
    }

    /// Serializes the element and its subtree, without its own tail.
    ///
    /// Attributes keep their order, namespace declarations are written as
    /// they appear in `attributes` and empty elements use the self-closing
    /// form. Signatures are computed on [`XmlElement::canonicalize`] instead.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Returns the exclusive canonical form (without comments) of this
    /// subtree.
    ///
    /// Every namespace prefix the subtree uses is declared where exclusive
    /// canonicalization renders it, resolved from the subtree itself, from
    /// [`XmlElement::inherited_namespaces`] or from the well-known SAML
    /// prefixes, so that a fragment taken out of a larger document yields the
    /// same bytes it had in place.
    pub fn canonicalize(&self) -> SamlResult<String> {
        self.canonicalize_with_prefixes(&[])
    }

    /// Exclusive canonical form that also renders the bindings of
    /// `inclusive_prefixes`, the `PrefixList` of an `InclusiveNamespaces`
    /// transform parameter. `#default` names the default namespace.
    pub fn canonicalize_with_prefixes(&self, inclusive_prefixes: &[String]) -> SamlResult<String> {
        let inclusive: Vec<String> = inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect();
        let mut input = String::new();
        self.write_exclusive(&mut input, &[], &[], &inclusive)?;

        let mut output = Vec::new();
        Canonicalizer::read_from_str(&input)
            .write_to_writer(&mut output)
            .canonicalize(false)
            .map_err(|e| SamlError::XmlParse(format!("canonicalization failed: {e}")))?;
        String::from_utf8(output)
            .map_err(|e| SamlError::XmlParse(format!("canonical form is not UTF-8: {e}")))
    }

    fn push_character_data(&mut self, data: &str) {
        match self.children.last_mut() {
            Some(last) => last.tail.push_str(data),
            None => self.text.push_str(data),
        }
    }

    fn write_to(&self, out: &mut String) {
        let name = self.qualified_name();
        out.push('<');
        out.push_str(&name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.write_to(out);
            out.push_str(&escape(child.tail.as_str()));
        }
        let _ = write!(out, "</{name}>");
    }

    /// Writes the subtree with the namespace declarations exclusive
    /// canonicalization renders and no others.
    ///
    /// `rendered` holds the bindings already output by ancestors, `known`
    /// every binding the ancestors declared or used.
    fn write_exclusive(
        &self,
        out: &mut String,
        rendered: &[(String, String)],
        known: &[(String, String)],
        inclusive: &[String],
    ) -> SamlResult<()> {
        let mut known = known.to_vec();
        for (key, value) in &self.attributes {
            if key == "xmlns" {
                known.push((String::new(), value.clone()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                known.push((prefix.to_string(), value.clone()));
            }
        }
        let element_prefix = self.prefix.clone().unwrap_or_default();
        if let Some(namespace) = &self.namespace {
            known.push((element_prefix.clone(), namespace.clone()));
        }

        let mut used = vec![element_prefix];
        for (key, _) in self.plain_attributes() {
            if let Some((prefix, _)) = key.split_once(':') {
                if prefix != "xml" && !used.iter().any(|p| p == prefix) {
                    used.push(prefix.to_string());
                }
            }
        }
        for prefix in inclusive {
            let in_scope = if prefix.is_empty() {
                lookup(&known, "").is_some() || lookup(&self.inherited_namespaces, "").is_some()
            } else {
                self.namespace_for(prefix, &known).is_some()
            };
            if in_scope && !used.contains(prefix) {
                used.push(prefix.clone());
            }
        }

        let mut rendered = rendered.to_vec();
        let mut declarations = Vec::new();
        for prefix in used {
            let namespace = if prefix.is_empty() && self.prefix.is_none() {
                self.namespace.clone().unwrap_or_default()
            } else if prefix.is_empty() {
                lookup(&known, "")
                    .or_else(|| lookup(&self.inherited_namespaces, ""))
                    .unwrap_or_default()
                    .to_string()
            } else {
                self.namespace_for(&prefix, &known).ok_or_else(|| {
                    SamlError::XmlParse(format!("namespace prefix {prefix} is not declared"))
                })?
            };
            let current = lookup(&rendered, &prefix);
            let needed = match current {
                Some(current) => current != namespace,
                None => !namespace.is_empty(),
            };
            if needed {
                rendered.push((prefix.clone(), namespace.clone()));
                declarations.push((prefix, namespace));
            }
        }

        let name = self.qualified_name();
        out.push('<');
        out.push_str(&name);
        for (prefix, namespace) in &declarations {
            let key = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            let _ = write!(out, " {key}=\"{}\"", escape(namespace.as_str()));
        }
        for (key, value) in self.plain_attributes() {
            let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.write_exclusive(out, &rendered, &known, inclusive)?;
            out.push_str(&escape(child.tail.as_str()));
        }
        let _ = write!(out, "</{name}>");
        Ok(())
    }

    fn plain_attributes(&self) -> impl Iterator<Item = &(String, String)> {
        self.attributes
            .iter()
            .filter(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"))
    }

    fn namespace_for(&self, prefix: &str, known: &[(String, String)]) -> Option<String> {
        if self.prefix.as_deref() == Some(prefix) {
            if let Some(namespace) = &self.namespace {
                return Some(namespace.clone());
            }
        }
        lookup(known, prefix)
            .or_else(|| lookup(&self.inherited_namespaces, prefix))
            .map(str::to_string)
            .or_else(|| well_known(prefix))
    }
}

/// Returns the innermost binding of `prefix`.
fn lookup<'a>(bindings: &'a [(String, String)], prefix: &str) -> Option<&'a str> {
    bindings
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn well_known(prefix: &str) -> Option<String> {
    WELL_KNOWN_PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| (*uri).to_string())
}

fn open_element(
    start: &BytesStart<'_>,
    scopes: &mut Vec<HashMap<String, String>>,
) -> SamlResult<XmlElement> {
    let qname = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| SamlError::XmlParse(format!("invalid element name: {e}")))?
        .to_string();

    let mut scope = scopes.last().cloned().unwrap_or_default();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| SamlError::XmlParse(format!("invalid attribute name: {e}")))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();

        if key == "xmlns" {
            scope.insert(String::new(), value.clone());
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value.clone());
        }
        attributes.push((key, value));
    }

    let (prefix, name) = match qname.split_once(':') {
        Some((prefix, name)) => (Some(prefix.to_string()), name.to_string()),
        None => (None, qname),
    };
    let namespace = resolve(&scope, prefix.as_deref().unwrap_or(""));

    let mut inherited_namespaces: Vec<(String, String)> = scopes
        .last()
        .map(|parent| {
            parent
                .iter()
                .filter(|(p, _)| !declares(&attributes, p))
                .map(|(p, uri)| (p.clone(), uri.clone()))
                .collect()
        })
        .unwrap_or_default();
    inherited_namespaces.sort();
    scopes.push(scope);

    Ok(XmlElement {
        prefix,
        name,
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
        tail: String::new(),
        inherited_namespaces,
    })
}

fn declares(attributes: &[(String, String)], prefix: &str) -> bool {
    attributes.iter().any(|(key, _)| {
        if prefix.is_empty() {
            key == "xmlns"
        } else {
            key.strip_prefix("xmlns:") == Some(prefix)
        }
    })
}

fn resolve(scope: &HashMap<String, String>, prefix: &str) -> Option<String> {
    scope.get(prefix).cloned().or_else(|| well_known(prefix))
}

fn close_element(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> SamlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(SamlError::XmlParse(
                "document has more than one root element".to_string(),
            ))
        }
    }
    Ok(())
}
