//! Frame <-> Message Codec
//!
//! Maps the generic [`Frame`] tree to typed requests and responses.
//!
//! ## Request layout
//!
//! ```text
//! [message_id:int, op:bulk, operands...]
//!
//! bind      [name, mechanism, credentials]
//! search    [base, scope:int, filter-text, [attr...]]
//! add       [name, [[attr, value...]...]]
//! modify    [name, [[add|delete|replace, attr, [value...]]...]]
//! delete    [name]
//! compare   [name, attr, value]
//! extended  [oid, value|null]
//! abandon   [target_id:int]
//! ```
//!
//! ## Response layout
//!
//! ```text
//! [message_id:int, kind:simple, code:int, diagnostic:bulk]
//! [message_id:int, "entry", name, [[attr, value]...]]
//! [message_id:int, "extended", code, diagnostic, name|null, value|null]
//! ```

use crate::directory::{Attribute, Entry, FilterParseError};
use crate::protocol::frame::Frame;
use crate::protocol::message::{
    entry_from_values, AddRequest, BindRequest, Change, ChangeOperation, CompareRequest,
    ExtendedRequest, LdapResult, Message, MessageId, ModifyRequest, OperationKind, Request,
    Response, ResultCode, SearchRequest, SearchScope,
};
use bytes::Bytes;
use thiserror::Error;

/// Errors mapping a well-formed frame to a typed message.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("message must be an array")]
    NotAnArray,

    #[error("missing or invalid message id")]
    InvalidMessageId,

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("wrong number of operands for '{operation}': expected {expected}, got {got}")]
    WrongArity {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid {0}")]
    InvalidField(&'static str),

    #[error("invalid search scope: {0}")]
    InvalidScope(i64),

    #[error("invalid filter: {0}")]
    Filter(#[from] FilterParseError),

    #[error("unknown response kind '{0}'")]
    UnknownResponse(String),

    #[error("unknown result code: {0}")]
    UnknownResultCode(i64),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// What could be salvaged from a frame that failed to decode. The connection
/// uses it to answer `protocolError` on the right message ID.
#[derive(Debug, PartialEq)]
pub struct DecodeFailure {
    pub id: Option<MessageId>,
    pub kind: Option<OperationKind>,
    pub error: CodecError,
}

/// Decodes a request frame.
pub fn decode_request(frame: Frame) -> Result<Message, DecodeFailure> {
    let parts = frame.into_array().ok_or(DecodeFailure {
        id: None,
        kind: None,
        error: CodecError::NotAnArray,
    })?;

    let id = parts.first().and_then(message_id);
    let kind = parts.get(1).and_then(Frame::as_str).and_then(OperationKind::parse);
    let fail = |error| DecodeFailure { id, kind, error };

    let id = id.ok_or_else(|| fail(CodecError::InvalidMessageId))?;
    let op = parts
        .get(1)
        .and_then(Frame::as_str)
        .ok_or_else(|| fail(CodecError::InvalidField("operation")))?;
    let kind = kind.ok_or_else(|| fail(CodecError::UnknownOperation(op.to_string())))?;

    let request = decode_operands(kind, &parts[2..]).map_err(fail)?;
    Ok(Message { id, request })
}

fn decode_operands(kind: OperationKind, args: &[Frame]) -> CodecResult<Request> {
    let request = match kind {
        OperationKind::Bind => {
            arity(kind, args, 3)?;
            Request::Bind(BindRequest {
                name: text(&args[0], "name")?,
                mechanism: text(&args[1], "mechanism")?,
                credentials: bytes(&args[2], "credentials")?,
            })
        }
        OperationKind::Search => {
            arity(kind, args, 4)?;
            let scope = args[1]
                .as_integer()
                .ok_or(CodecError::InvalidField("scope"))?;
            Request::Search(SearchRequest {
                base: text(&args[0], "base")?,
                scope: SearchScope::from_code(scope).ok_or(CodecError::InvalidScope(scope))?,
                filter: text(&args[2], "filter")?.parse()?,
                attributes: list(&args[3], "attributes")?
                    .iter()
                    .map(|a| text(a, "attribute"))
                    .collect::<CodecResult<_>>()?,
            })
        }
        OperationKind::Add => {
            arity(kind, args, 2)?;
            let mut values = Vec::new();
            for item in list(&args[1], "attributes")? {
                let item = list(item, "attribute")?;
                let (name, vals) = item.split_first().ok_or(CodecError::InvalidField("attribute"))?;
                let vals = vals
                    .iter()
                    .map(|v| bytes(v, "value"))
                    .collect::<CodecResult<Vec<_>>>()?;
                values.push((text(name, "attribute")?, vals));
            }
            Request::Add(AddRequest {
                entry: entry_from_values(text(&args[0], "name")?, values),
            })
        }
        OperationKind::Modify => {
            arity(kind, args, 2)?;
            let mut changes = Vec::new();
            for item in list(&args[1], "changes")? {
                let item = list(item, "change")?;
                if item.len() != 3 {
                    return Err(CodecError::InvalidField("change"));
                }
                let operation = ChangeOperation::parse(&text(&item[0], "change operation")?)
                    .ok_or(CodecError::InvalidField("change operation"))?;
                changes.push(Change {
                    operation,
                    attribute: text(&item[1], "attribute")?,
                    values: list(&item[2], "values")?
                        .iter()
                        .map(|v| bytes(v, "value"))
                        .collect::<CodecResult<_>>()?,
                });
            }
            Request::Modify(ModifyRequest {
                name: text(&args[0], "name")?,
                changes,
            })
        }
        OperationKind::Delete => {
            arity(kind, args, 1)?;
            Request::Delete {
                name: text(&args[0], "name")?,
            }
        }
        OperationKind::Compare => {
            arity(kind, args, 3)?;
            Request::Compare(CompareRequest {
                name: text(&args[0], "name")?,
                attribute: text(&args[1], "attribute")?,
                value: text(&args[2], "value")?,
            })
        }
        OperationKind::Extended => {
            if args.is_empty() || args.len() > 2 {
                return Err(CodecError::WrongArity {
                    operation: kind.as_str(),
                    expected: 2,
                    got: args.len(),
                });
            }
            let value = match args.get(1) {
                None | Some(Frame::Null) => None,
                Some(v) => Some(bytes(v, "value")?),
            };
            Request::Extended(ExtendedRequest {
                name: text(&args[0], "name")?,
                value,
            })
        }
        OperationKind::Abandon => {
            arity(kind, args, 1)?;
            Request::Abandon(message_id(&args[0]).ok_or(CodecError::InvalidField("target id"))?)
        }
    };
    Ok(request)
}

/// Encodes a request; used by clients and tests.
pub fn encode_request(message: &Message) -> Frame {
    let mut parts = vec![
        Frame::integer(message.id as i64),
        Frame::bulk(message.request.kind().as_str()),
    ];
    match &message.request {
        Request::Bind(r) => {
            parts.push(Frame::bulk(r.name.clone()));
            parts.push(Frame::bulk(r.mechanism.clone()));
            parts.push(Frame::bulk(r.credentials.clone()));
        }
        Request::Search(r) => {
            parts.push(Frame::bulk(r.base.clone()));
            parts.push(Frame::integer(r.scope.code()));
            parts.push(Frame::bulk(r.filter_text()));
            parts.push(Frame::array(
                r.attributes.iter().map(|a| Frame::bulk(a.clone())).collect(),
            ));
        }
        Request::Add(r) => {
            parts.push(Frame::bulk(r.entry.name.clone()));
            parts.push(Frame::array(
                r.entry
                    .attributes
                    .iter()
                    .map(|a| Frame::array(vec![Frame::bulk(a.name.clone()), Frame::bulk(a.value.clone())]))
                    .collect(),
            ));
        }
        Request::Modify(r) => {
            parts.push(Frame::bulk(r.name.clone()));
            parts.push(Frame::array(
                r.changes
                    .iter()
                    .map(|c| {
                        Frame::array(vec![
                            Frame::bulk(c.operation.as_str()),
                            Frame::bulk(c.attribute.clone()),
                            Frame::array(c.values.iter().cloned().map(Frame::Bulk).collect()),
                        ])
                    })
                    .collect(),
            ));
        }
        Request::Delete { name } => parts.push(Frame::bulk(name.clone())),
        Request::Compare(r) => {
            parts.push(Frame::bulk(r.name.clone()));
            parts.push(Frame::bulk(r.attribute.clone()));
            parts.push(Frame::bulk(r.value.clone()));
        }
        Request::Extended(r) => {
            parts.push(Frame::bulk(r.name.clone()));
            parts.push(Frame::optional(r.value.clone()));
        }
        Request::Abandon(target) => parts.push(Frame::integer(*target as i64)),
    }
    Frame::array(parts)
}

/// Encodes a response for message `id`.
pub fn encode_response(id: MessageId, response: &Response) -> Frame {
    let mut parts = vec![Frame::integer(id as i64), Frame::simple(response.kind_str())];
    match response {
        Response::SearchEntry(entry) => {
            parts.push(Frame::bulk(entry.name.clone()));
            parts.push(Frame::array(
                entry
                    .attributes
                    .iter()
                    .map(|a| Frame::array(vec![Frame::bulk(a.name.clone()), Frame::bulk(a.value.clone())]))
                    .collect(),
            ));
        }
        Response::Extended {
            result,
            name,
            value,
        } => {
            push_result(&mut parts, result);
            parts.push(Frame::optional(name.clone()));
            parts.push(Frame::optional(value.clone()));
        }
        other => {
            if let Some(result) = other.result() {
                push_result(&mut parts, result);
            }
        }
    }
    Frame::array(parts)
}

fn push_result(parts: &mut Vec<Frame>, result: &LdapResult) {
    parts.push(Frame::integer(result.code.code()));
    parts.push(Frame::bulk(result.diagnostic.clone()));
}

/// Decodes a response frame; used by clients and tests.
pub fn decode_response(frame: Frame) -> CodecResult<(MessageId, Response)> {
    let parts = frame.into_array().ok_or(CodecError::NotAnArray)?;
    let id = parts
        .first()
        .and_then(message_id)
        .ok_or(CodecError::InvalidMessageId)?;
    let kind = parts
        .get(1)
        .and_then(Frame::as_str)
        .ok_or(CodecError::InvalidField("response kind"))?;

    if kind == "entry" {
        let name = text(parts.get(2).ok_or(CodecError::InvalidField("name"))?, "name")?;
        let mut entry = Entry::new(name);
        for item in list(parts.get(3).ok_or(CodecError::InvalidField("attributes"))?, "attributes")? {
            match list(item, "attribute")? {
                [name, value] => entry.push(Attribute::new(text(name, "attribute")?, bytes(value, "value")?)),
                _ => return Err(CodecError::InvalidField("attribute")),
            }
        }
        return Ok((id, Response::SearchEntry(entry)));
    }

    let code = parts
        .get(2)
        .and_then(Frame::as_integer)
        .ok_or(CodecError::InvalidField("result code"))?;
    let result = LdapResult {
        code: ResultCode::from_code(code).ok_or(CodecError::UnknownResultCode(code))?,
        diagnostic: parts
            .get(3)
            .and_then(Frame::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let response = match kind {
        "bind" => Response::Bind(result),
        "search" => Response::SearchDone(result),
        "add" => Response::Add(result),
        "modify" => Response::Modify(result),
        "delete" => Response::Delete(result),
        "compare" => Response::Compare(result),
        "extended" => Response::Extended {
            result,
            name: parts.get(4).and_then(Frame::as_str).map(str::to_string),
            value: parts.get(5).and_then(Frame::as_bytes).cloned(),
        },
        other => return Err(CodecError::UnknownResponse(other.to_string())),
    };
    Ok((id, response))
}

fn arity(kind: OperationKind, args: &[Frame], expected: usize) -> CodecResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CodecError::WrongArity {
            operation: kind.as_str(),
            expected,
            got: args.len(),
        })
    }
}

fn message_id(frame: &Frame) -> Option<MessageId> {
    frame.as_integer().and_then(|n| MessageId::try_from(n).ok())
}

fn text(frame: &Frame, field: &'static str) -> CodecResult<String> {
    frame
        .as_str()
        .map(str::to_string)
        .ok_or(CodecError::InvalidField(field))
}

fn bytes(frame: &Frame, field: &'static str) -> CodecResult<Bytes> {
    match frame {
        Frame::Bulk(b) => Ok(b.clone()),
        Frame::Simple(s) => Ok(Bytes::from(s.clone())),
        _ => Err(CodecError::InvalidField(field)),
    }
}

fn list<'a>(frame: &'a Frame, field: &'static str) -> CodecResult<&'a [Frame]> {
    frame.as_array().ok_or(CodecError::InvalidField(field))
}
