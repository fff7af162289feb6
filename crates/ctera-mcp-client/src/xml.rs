//! CTERA object XML decoding.
//!
//! The management API speaks a small generic object language:
//! `<obj class="..">` holds `<att id="..">` children, `<list>` holds values,
//! and `<val>` holds text. Documents are decoded into `serde_json::Value`
//! (objects, arrays, strings, nulls) with the object class kept under
//! `_classname`.

use quick_xml::{
    events::{BytesStart, Event},
    reader::Reader,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// XML decoding error.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("Unexpected document structure: {0}")]
    Structure(String),
}

enum Frame {
    Object {
        class: Option<String>,
        fields: Map<String, Value>,
    },
    Attribute {
        id: String,
        value: Option<Value>,
    },
    List(Vec<Value>),
    Text(String),
}

/// Decode a CTERA object document.
///
/// # Errors
/// Returns error if the XML is malformed or uses elements outside the
/// object language.
pub fn parse_document(input: &str) -> Result<Value, XmlError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open_frame(&start)?),
            Event::Empty(start) => {
                let frame = open_frame(&start)?;
                close_frame(frame, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("unbalanced closing tag".to_string()))?;
                close_frame(frame, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                if let Some(Frame::Text(buf)) = stack.last_mut() {
                    buf.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(Frame::Text(buf)) = stack.last_mut() {
                    buf.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Structure("unterminated element".to_string()));
    }
    root.ok_or_else(|| XmlError::Structure("empty document".to_string()))
}

fn open_frame(start: &BytesStart<'_>) -> Result<Frame, XmlError> {
    match start.name().as_ref() {
        b"obj" => {
            let class = match start.try_get_attribute("class").map_err(quick_xml::Error::from)? {
                Some(attr) => Some(attr.unescape_value()?.into_owned()),
                None => None,
            };
            Ok(Frame::Object {
                class,
                fields: Map::new(),
            })
        }
        b"att" => {
            let id = start
                .try_get_attribute("id")
                .map_err(quick_xml::Error::from)?
                .ok_or_else(|| XmlError::Structure("<att> without id".to_string()))?
                .unescape_value()?
                .into_owned();
            Ok(Frame::Attribute { id, value: None })
        }
        b"list" => Ok(Frame::List(Vec::new())),
        b"val" => Ok(Frame::Text(String::new())),
        other => Err(XmlError::Structure(format!(
            "unknown element <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn close_frame(
    frame: Frame,
    stack: &mut [Frame],
    root: &mut Option<Value>,
) -> Result<(), XmlError> {
    let value = match frame {
        Frame::Object { class, mut fields } => {
            if let Some(class) = class {
                fields.insert("_classname".to_string(), Value::String(class));
            }
            Value::Object(fields)
        }
        Frame::List(items) => Value::Array(items),
        Frame::Text(text) if text.is_empty() => Value::Null,
        Frame::Text(text) => Value::String(text),
        Frame::Attribute { id, value } => {
            return match stack.last_mut() {
                Some(Frame::Object { fields, .. }) => {
                    fields.insert(id, value.unwrap_or(Value::Null));
                    Ok(())
                }
                _ => Err(XmlError::Structure(format!(
                    "attribute {id:?} outside an object"
                ))),
            };
        }
    };

    match stack.last_mut() {
        None if root.is_some() => Err(XmlError::Structure("multiple root elements".to_string())),
        None => {
            *root = Some(value);
            Ok(())
        }
        Some(Frame::Attribute { value: slot, .. }) => {
            *slot = Some(value);
            Ok(())
        }
        Some(Frame::List(items)) => {
            items.push(value);
            Ok(())
        }
        Some(Frame::Object { .. }) => Err(XmlError::Structure(
            "value placed directly inside an object".to_string(),
        )),
        Some(Frame::Text(_)) => Err(XmlError::Structure(
            "element nested inside a value".to_string(),
        )),
    }
}
