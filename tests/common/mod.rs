//! In-process mock of a Tarantool server, good enough for protocol tests:
//! sends a well-formed greeting, decodes request frames and answers
//! ping/insert/replace/select/delete/call with canned IPROTO responses.

use std::{collections::HashMap, io::Cursor, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use rmpv::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

// IPROTO wire constants, mirrored server-side.
const KEY_REQUEST_TYPE: u64 = 0x00;
const KEY_SYNC: u64 = 0x01;
const KEY_SCHEMA_VERSION: u8 = 0x05;
const KEY_SPACE_ID: u64 = 0x10;
const KEY_LIMIT: u64 = 0x12;
const KEY_KEY: u64 = 0x20;
const KEY_TUPLE: u64 = 0x21;
const KEY_FUNCTION_NAME: u64 = 0x22;
const KEY_DATA: u8 = 0x30;
const KEY_ERROR_24: u8 = 0x31;
const KEY_ERROR: u8 = 0x52;

const TYPE_SELECT: u64 = 1;
const TYPE_INSERT: u64 = 2;
const TYPE_REPLACE: u64 = 3;
const TYPE_UPDATE: u64 = 4;
const TYPE_DELETE: u64 = 5;
const TYPE_UPSERT: u64 = 9;
const TYPE_CALL: u64 = 10;
const TYPE_PING: u64 = 64;

#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Sleep before answering each request.
    pub response_delay: Option<Duration>,
    /// Send only the first bytes of the first response, then close.
    pub truncate_response: bool,
}

pub struct MockServer {
    pub port: u16,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(ServerOptions::default()).await
    }

    pub async fn start_with(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle_client(socket, options.clone()));
            }
        });
        MockServer { port }
    }
}

async fn handle_client(mut socket: TcpStream, options: ServerOptions) {
    if socket.write_all(&greeting()).await.is_err() {
        return;
    }
    let mut spaces: HashMap<u64, Vec<Value>> = HashMap::new();
    loop {
        let Some(frame) = read_frame(&mut socket).await else {
            return;
        };
        let (request_type, sync, body) = parse_request(&frame);
        if let Some(delay) = options.response_delay {
            tokio::time::sleep(delay).await;
        }
        let response = dispatch(request_type, sync, &body, &mut spaces);
        if options.truncate_response {
            let _ = socket.write_all(&response[..3]).await;
            return;
        }
        if socket.write_all(&response).await.is_err() {
            return;
        }
    }
}

fn greeting() -> [u8; 128] {
    let mut block = [b' '; 128];
    let line1 = b"Tarantool 2.10.0 (Binary) 00000000-1111-2222-3333-444444444444";
    block[..line1.len()].copy_from_slice(line1);
    block[63] = b'\n';
    let salt = STANDARD.encode([7u8; 32]);
    block[64..64 + salt.len()].copy_from_slice(salt.as_bytes());
    block[127] = b'\n';
    block
}

async fn read_frame(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut tag = [0u8; 1];
    socket.read_exact(&mut tag).await.ok()?;
    let size = match tag[0] {
        byte if byte < 0x80 => byte as usize,
        0xcc => {
            let mut raw = [0u8; 1];
            socket.read_exact(&mut raw).await.ok()?;
            raw[0] as usize
        }
        0xcd => {
            let mut raw = [0u8; 2];
            socket.read_exact(&mut raw).await.ok()?;
            u16::from_be_bytes(raw) as usize
        }
        0xce => {
            let mut raw = [0u8; 4];
            socket.read_exact(&mut raw).await.ok()?;
            u32::from_be_bytes(raw) as usize
        }
        _ => return None,
    };
    let mut payload = vec![0u8; size];
    socket.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

fn parse_request(frame: &[u8]) -> (u64, u64, HashMap<u64, Value>) {
    let mut cursor = Cursor::new(frame);
    let header = read_int_map(&mut cursor);
    let body = read_int_map(&mut cursor);
    let request_type = header
        .get(&KEY_REQUEST_TYPE)
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let sync = header.get(&KEY_SYNC).and_then(Value::as_u64).unwrap_or(0);
    (request_type, sync, body)
}

fn read_int_map(cursor: &mut Cursor<&[u8]>) -> HashMap<u64, Value> {
    let mut out = HashMap::new();
    let Ok(len) = rmp::decode::read_map_len(cursor) else {
        return out;
    };
    for _ in 0..len {
        let Ok(key) = rmp::decode::read_int::<u64, _>(cursor) else {
            return out;
        };
        let Ok(value) = rmpv::decode::read_value(cursor) else {
            return out;
        };
        out.insert(key, value);
    }
    out
}

fn first_field(tuple: &Value) -> Option<&Value> {
    tuple.as_array().and_then(|fields| fields.first())
}

fn dispatch(
    request_type: u64,
    sync: u64,
    body: &HashMap<u64, Value>,
    spaces: &mut HashMap<u64, Vec<Value>>,
) -> Vec<u8> {
    match request_type {
        TYPE_PING => ok_response(sync, None),
        TYPE_INSERT | TYPE_REPLACE => {
            let space = body.get(&KEY_SPACE_ID).and_then(Value::as_u64).unwrap_or(0);
            let tuple = body.get(&KEY_TUPLE).cloned().unwrap_or(Value::Nil);
            let rows = spaces.entry(space).or_default();
            let existing = rows
                .iter()
                .position(|row| first_field(row) == first_field(&tuple));
            match existing {
                Some(index) => rows[index] = tuple.clone(),
                None => rows.push(tuple.clone()),
            }
            ok_response(sync, Some(vec![tuple]))
        }
        TYPE_SELECT => {
            let space = body.get(&KEY_SPACE_ID).and_then(Value::as_u64).unwrap_or(0);
            let limit = body
                .get(&KEY_LIMIT)
                .and_then(Value::as_u64)
                .unwrap_or(u64::MAX) as usize;
            let key = body
                .get(&KEY_KEY)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let rows = spaces.get(&space).cloned().unwrap_or_default();
            let matched: Vec<Value> = rows
                .into_iter()
                .filter(|row| key.is_empty() || first_field(row) == key.first())
                .take(limit)
                .collect();
            ok_response(sync, Some(matched))
        }
        TYPE_DELETE => {
            let space = body.get(&KEY_SPACE_ID).and_then(Value::as_u64).unwrap_or(0);
            let key = body
                .get(&KEY_KEY)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let rows = spaces.entry(space).or_default();
            let mut removed = Vec::new();
            rows.retain(|row| {
                if first_field(row) == key.first() {
                    removed.push(row.clone());
                    false
                } else {
                    true
                }
            });
            ok_response(sync, Some(removed))
        }
        TYPE_UPDATE | TYPE_UPSERT => ok_response(sync, Some(Vec::new())),
        TYPE_CALL => {
            let name = body
                .get(&KEY_FUNCTION_NAME)
                .and_then(Value::as_str)
                .unwrap_or("");
            if name == "echo" {
                let args = body.get(&KEY_TUPLE).cloned().unwrap_or(Value::Nil);
                ok_response(sync, Some(vec![args]))
            } else {
                error_response(sync, 33, &format!("Procedure '{}' is not defined", name))
            }
        }
        other => error_response(sync, 48, &format!("Unknown request type {}", other)),
    }
}

fn ok_response(sync: u64, data: Option<Vec<Value>>) -> Vec<u8> {
    let mut payload = Vec::new();
    rmp::encode::write_map_len(&mut payload, 3).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_REQUEST_TYPE as u8).unwrap();
    rmp::encode::write_uint(&mut payload, 0).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_SYNC as u8).unwrap();
    rmp::encode::write_uint(&mut payload, sync).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_SCHEMA_VERSION).unwrap();
    rmp::encode::write_uint(&mut payload, 1).unwrap();

    match data {
        Some(tuples) => {
            rmp::encode::write_map_len(&mut payload, 1).unwrap();
            rmp::encode::write_pfix(&mut payload, KEY_DATA).unwrap();
            rmpv::encode::write_value(&mut payload, &Value::Array(tuples)).unwrap();
        }
        None => {
            rmp::encode::write_map_len(&mut payload, 0).unwrap();
        }
    }
    frame(payload)
}

fn error_response(sync: u64, errcode: u32, msg: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    rmp::encode::write_map_len(&mut payload, 2).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_REQUEST_TYPE as u8).unwrap();
    rmp::encode::write_uint(&mut payload, u64::from(0x8000 | errcode)).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_SYNC as u8).unwrap();
    rmp::encode::write_uint(&mut payload, sync).unwrap();

    let stack = Value::Map(vec![(
        0.into(),
        Value::Array(vec![Value::Map(vec![
            (0.into(), "ClientError".into()),
            (1.into(), "eval.c".into()),
            (2.into(), 42.into()),
            (3.into(), msg.into()),
            (4.into(), 0.into()),
            (5.into(), errcode.into()),
        ])]),
    )]);
    rmp::encode::write_map_len(&mut payload, 2).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_ERROR_24).unwrap();
    rmpv::encode::write_value(&mut payload, &Value::from(msg)).unwrap();
    rmp::encode::write_pfix(&mut payload, KEY_ERROR).unwrap();
    rmpv::encode::write_value(&mut payload, &stack).unwrap();
    frame(payload)
}

fn frame(payload: Vec<u8>) -> Vec<u8> {
    let mut bytes = vec![0xce];
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&payload);
    bytes
}
