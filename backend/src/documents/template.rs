use std::fmt::Write;

use super::snapshot::{format_amount, NormalizedQuote};

/// Text nodes are escaped when written.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    LineBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: &'static str,
    attrs: Vec<(&'static str, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, value.into()));
        self
    }

    pub fn class(self, value: &'static str) -> Self {
        self.attr("class", value)
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }

    pub fn text(self, value: impl Into<String>) -> Self {
        self.child(Node::Text(value.into()))
    }

    /// Text where each newline becomes a `<br/>`.
    pub fn multiline(mut self, value: &str) -> Self {
        for (idx, line) in value.split('\n').enumerate() {
            if idx > 0 {
                self.children.push(Node::LineBreak);
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if !line.is_empty() {
                self.children.push(Node::Text(line.to_string()));
            }
        }
        self
    }

    fn write_to(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.tag);
        for (name, value) in &self.attrs {
            let _ = write!(out, " {name}=\"{}\"", escape(value));
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

impl Node {
    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write_to(out),
            Node::Text(text) => out.push_str(&escape(text)),
            Node::LineBreak => out.push_str("<br/>"),
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Node::Element(value)
    }
}

pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

const STYLE: &str = "\
body { font-family: Arial, sans-serif; padding: 24px; color: #111 }
h1 { color: #0b69ff }
.section { margin-bottom: 16px }
.label { font-weight: bold }
.value { margin-left: 8px }
.services { margin-top: 8px }
table { width: 100%; border-collapse: collapse }
td, th { padding: 8px; border: 1px solid #ddd }
td.amount, th.amount { text-align: right }
tfoot td { font-weight: bold }";

fn labelled(label: &str, value: String) -> Node {
    Element::new("div")
        .child(Element::new("span").class("label").text(label))
        .child(Element::new("span").class("value").text(value))
        .into()
}

fn cell(value: String) -> Node {
    Element::new("td").text(value).into()
}

fn amount_cell(value: String) -> Node {
    Element::new("td").class("amount").text(value).into()
}

/// Lays out the single-page quote.
pub fn quote_page(quote: &NormalizedQuote) -> Element {
    let client_name = if quote.client_name.is_empty() {
        "Client"
    } else {
        quote.client_name.as_str()
    };

    let head = Element::new("head")
        .child(Element::new("meta").attr("charset", "utf-8"))
        .child(Element::new("title").text(format!("Devis - {client_name}")))
        .child(Element::new("style").child(Node::Text(STYLE.to_string())));

    let mut header = Element::new("div").class("section").child(labelled(
        "Client:",
        format!("{} ({})", quote.client_name, quote.client_email),
    ));
    header = header.child(labelled("Téléphone:", quote.client_phone.clone()));
    if let Some(number) = &quote.quote_number {
        header = header.child(labelled("Référence:", number.clone()));
    }

    let description = Element::new("div")
        .class("section")
        .child(Element::new("div").class("label").text("Description du projet"))
        .child(
            Element::new("div")
                .class("value")
                .multiline(&quote.project_description),
        );

    let items = quote.lines.iter().map(|line| {
        Node::from(Element::new("li").text(format!("{} - {}", line.name, line.description)))
    });
    let services = Element::new("div")
        .class("section")
        .child(Element::new("div").class("label").text("Services demandés"))
        .child(
            Element::new("div")
                .class("services")
                .child(Element::new("ul").children(items)),
        );

    let rows = quote.lines.iter().map(|line| {
        Node::from(
            Element::new("tr")
                .child(cell(line.name.clone()))
                .child(amount_cell(format_amount(line.quantity)))
                .child(amount_cell(format_amount(line.unit_price)))
                .child(amount_cell(format_amount(line.total))),
        )
    });
    let header_row = Element::new("tr")
        .child(Element::new("th").text("Item"))
        .child(Element::new("th").class("amount").text("Qte"))
        .child(Element::new("th").class("amount").text("Prix Unitaire"))
        .child(Element::new("th").class("amount").text("Total"));
    let footer_row = |label: &str, value: f64| {
        Node::from(
            Element::new("tr")
                .child(Element::new("td").attr("colspan", "3").text(label))
                .child(amount_cell(format!(
                    "{} {}",
                    format_amount(value),
                    quote.currency
                ))),
        )
    };
    let table = Element::new("table")
        .child(Element::new("thead").child(header_row))
        .child(Element::new("tbody").children(rows))
        .child(Element::new("tfoot").children([
            footer_row("Sous-total", quote.subtotal),
            footer_row("TVA", quote.tax),
            footer_row("Total", quote.total),
        ]));

    let body = Element::new("body")
        .child(Element::new("h1").text(format!("Devis - {}", quote.project_title)))
        .child(header)
        .child(description)
        .child(services)
        .child(Element::new("div").class("section").child(table));

    Element::new("html").child(head).child(body)
}

pub fn render_html(root: &Element) -> String {
    let mut out = String::from("<!DOCTYPE html>");
    root.write_to(&mut out);
    out
}
