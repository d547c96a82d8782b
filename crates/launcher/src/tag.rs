use thiserror::Error;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// One value in the little-endian named-tag tree that backs the
/// world-state file. The launcher only interprets a handful of fields;
/// everything else is carried through so a read-write cycle reproduces
/// the input byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List { element_id: u8, items: Vec<TagValue> },
    Compound(TagCompound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl TagValue {
    fn id(&self) -> u8 {
        match self {
            TagValue::Byte(_) => TAG_BYTE,
            TagValue::Short(_) => TAG_SHORT,
            TagValue::Int(_) => TAG_INT,
            TagValue::Long(_) => TAG_LONG,
            TagValue::Float(_) => TAG_FLOAT,
            TagValue::Double(_) => TAG_DOUBLE,
            TagValue::ByteArray(_) => TAG_BYTE_ARRAY,
            TagValue::String(_) => TAG_STRING,
            TagValue::List { .. } => TAG_LIST,
            TagValue::Compound(_) => TAG_COMPOUND,
            TagValue::IntArray(_) => TAG_INT_ARRAY,
            TagValue::LongArray(_) => TAG_LONG_ARRAY,
        }
    }
}

/// Ordered name-to-value mapping. Entry order is the file order and is
/// preserved across get/put, which is what keeps patched saves stable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagCompound {
    entries: Vec<(String, TagValue)>,
}

impl TagCompound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, value)| value)
    }

    /// Replaces an existing entry in place, keeping its position, or
    /// appends when the name is absent.
    pub fn put(&mut self, name: impl Into<String>, value: TagValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(entry_name, _)| *entry_name == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn put_bool(&mut self, name: impl Into<String>, value: bool) {
        self.put(name, TagValue::Byte(if value { 1 } else { 0 }));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, TagValue)> for TagCompound {
    fn from_iter<I: IntoIterator<Item = (String, TagValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("unexpected end of tag data at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("unknown tag id {id} at offset {offset}")]
    UnknownTagId { id: u8, offset: usize },
    #[error("invalid UTF-8 in tag string at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("negative length {length} at offset {offset}")]
    NegativeLength { length: i32, offset: usize },
    #[error("{trailing} trailing bytes after tag payload")]
    TrailingBytes { trailing: usize },
    #[error("string of {length} bytes exceeds the u16 length prefix")]
    StringTooLong { length: usize },
}

/// Decodes exactly one named tag; the slice must contain nothing else.
pub fn decode_named(bytes: &[u8]) -> Result<(String, TagValue), TagError> {
    let mut cursor = 0usize;
    let id = read_u8(bytes, &mut cursor)?;
    if id == TAG_END || id > TAG_LONG_ARRAY {
        return Err(TagError::UnknownTagId { id, offset: 0 });
    }
    let name = read_string(bytes, &mut cursor)?;
    let value = decode_value(bytes, &mut cursor, id)?;
    if cursor != bytes.len() {
        return Err(TagError::TrailingBytes {
            trailing: bytes.len() - cursor,
        });
    }
    Ok((name, value))
}

pub fn encode_named(name: &str, value: &TagValue, out: &mut Vec<u8>) -> Result<(), TagError> {
    out.push(value.id());
    write_string(out, name)?;
    encode_value(value, out)
}

pub fn encode_named_compound(
    name: &str,
    compound: &TagCompound,
    out: &mut Vec<u8>,
) -> Result<(), TagError> {
    out.push(TAG_COMPOUND);
    write_string(out, name)?;
    encode_compound(compound, out)
}

fn encode_value(value: &TagValue, out: &mut Vec<u8>) -> Result<(), TagError> {
    match value {
        TagValue::Byte(v) => out.push(*v as u8),
        TagValue::Short(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::ByteArray(v) => {
            out.extend_from_slice(&(v.len() as i32).to_le_bytes());
            out.extend_from_slice(v);
        }
        TagValue::String(v) => write_string(out, v)?,
        TagValue::List { element_id, items } => {
            out.push(*element_id);
            out.extend_from_slice(&(items.len() as i32).to_le_bytes());
            for item in items {
                encode_value(item, out)?;
            }
        }
        TagValue::Compound(compound) => encode_compound(compound, out)?,
        TagValue::IntArray(v) => {
            out.extend_from_slice(&(v.len() as i32).to_le_bytes());
            for item in v {
                out.extend_from_slice(&item.to_le_bytes());
            }
        }
        TagValue::LongArray(v) => {
            out.extend_from_slice(&(v.len() as i32).to_le_bytes());
            for item in v {
                out.extend_from_slice(&item.to_le_bytes());
            }
        }
    }
    Ok(())
}

fn encode_compound(compound: &TagCompound, out: &mut Vec<u8>) -> Result<(), TagError> {
    for (name, value) in compound.entries() {
        out.push(value.id());
        write_string(out, name)?;
        encode_value(value, out)?;
    }
    out.push(TAG_END);
    Ok(())
}

fn decode_value(bytes: &[u8], cursor: &mut usize, id: u8) -> Result<TagValue, TagError> {
    Ok(match id {
        TAG_BYTE => TagValue::Byte(read_u8(bytes, cursor)? as i8),
        TAG_SHORT => TagValue::Short(i16::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_INT => TagValue::Int(i32::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_LONG => TagValue::Long(i64::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_FLOAT => TagValue::Float(f32::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_DOUBLE => TagValue::Double(f64::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_BYTE_ARRAY => {
            let len = read_len(bytes, cursor)?;
            TagValue::ByteArray(read_exact(bytes, cursor, len)?.to_vec())
        }
        TAG_STRING => TagValue::String(read_string(bytes, cursor)?),
        TAG_LIST => {
            let element_id = read_u8(bytes, cursor)?;
            let len = read_len(bytes, cursor)?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(decode_value(bytes, cursor, element_id)?);
            }
            TagValue::List { element_id, items }
        }
        TAG_COMPOUND => TagValue::Compound(decode_compound(bytes, cursor)?),
        TAG_INT_ARRAY => {
            let len = read_len(bytes, cursor)?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(i32::from_le_bytes(read_array(bytes, cursor)?));
            }
            TagValue::IntArray(items)
        }
        TAG_LONG_ARRAY => {
            let len = read_len(bytes, cursor)?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(i64::from_le_bytes(read_array(bytes, cursor)?));
            }
            TagValue::LongArray(items)
        }
        other => {
            return Err(TagError::UnknownTagId {
                id: other,
                offset: cursor.saturating_sub(1),
            })
        }
    })
}

fn decode_compound(bytes: &[u8], cursor: &mut usize) -> Result<TagCompound, TagError> {
    let mut compound = TagCompound::new();
    loop {
        let id = read_u8(bytes, cursor)?;
        if id == TAG_END {
            return Ok(compound);
        }
        let name = read_string(bytes, cursor)?;
        let value = decode_value(bytes, cursor, id)?;
        compound.put(name, value);
    }
}

fn write_string(out: &mut Vec<u8>, value: &str) -> Result<(), TagError> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(TagError::StringTooLong {
            length: bytes.len(),
        });
    }
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String, TagError> {
    let len = u16::from_le_bytes(read_array(bytes, cursor)?) as usize;
    let offset = *cursor;
    let raw = read_exact(bytes, cursor, len)?;
    std::str::from_utf8(raw)
        .map(|value| value.to_string())
        .map_err(|_| TagError::InvalidUtf8 { offset })
}

fn read_len(bytes: &[u8], cursor: &mut usize) -> Result<usize, TagError> {
    let offset = *cursor;
    let raw = i32::from_le_bytes(read_array(bytes, cursor)?);
    if raw < 0 {
        return Err(TagError::NegativeLength {
            length: raw,
            offset,
        });
    }
    Ok(raw as usize)
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, TagError> {
    Ok(read_exact(bytes, cursor, 1)?[0])
}

fn read_array<const N: usize>(bytes: &[u8], cursor: &mut usize) -> Result<[u8; N], TagError> {
    let offset = *cursor;
    read_exact(bytes, cursor, N)?
        .try_into()
        .map_err(|_| TagError::UnexpectedEof { offset })
}

fn read_exact<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], TagError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(TagError::UnexpectedEof { offset: *cursor });
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}
