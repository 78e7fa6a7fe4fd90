//! The engine's human readable message format, restricted to the graph schema.
//!
//! Output follows the engine's own printer: two-space indentation, fields in
//! field-number order, map entries sorted by key, default scalars left out.

use std::{collections::BTreeMap, fmt, iter::Peekable, str::Chars};

use thiserror::Error;

use crate::{
    attr::AttrMap,
    proto::{
        attr_value::{ListValue, Value as AttrOneof},
        data_type_name, full_type_from_name, full_type_name,
        full_type_def::Attr as TypeAttr,
        function_def::ArgAttrs,
        graph_debug_info::{FileLineCol, StackTrace},
        node_def::ExperimentalDebugInfo,
        op_def::{ArgDef, AttrDef},
        resource_handle_proto::DtypeAndShape,
        tensor_shape_proto::Dim,
        AttrValue, DataType, FullTypeDef, FunctionDef, FunctionDefLibrary, GradientDef,
        GraphDebugInfo, GraphDef, NameAttrList, NodeDef, OpDef, OpDeprecation, RegisteredGradient,
        ResourceHandleProto, TensorProto, TensorShapeProto, VariantTensorDataProto, VersionDef,
    },
};

/// Messages nested deeper than this are rejected while parsing.
pub const MAX_DEPTH: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

pub fn parse(src: &str) -> Result<GraphDef, ParseError> {
    let tokens = Lexer::new(src).tokens()?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        depth: 0,
        end: Pos::default(),
    };
    parser.end = parser.tokens.last().map_or(Pos::default(), |(pos, _)| *pos);
    graph_def(parser.fields(None)?)
}

pub fn to_string(graph: &GraphDef) -> String {
    let mut p = Printer::default();
    for node in &graph.node {
        p.message("node", |p| p.node_def(node));
    }
    if let Some(library) = &graph.library {
        p.message("library", |p| p.library(library));
    }
    p.nonzero("version", graph.version);
    if let Some(versions) = &graph.versions {
        p.message("versions", |p| p.version_def(versions));
    }
    if let Some(info) = &graph.debug_info {
        p.message("debug_info", |p| p.debug_info(info));
    }
    p.out
}

// Lexing

#[derive(Debug, Clone, Copy)]
struct Pos {
    line: usize,
    column: usize,
}

impl Default for Pos {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl Pos {
    fn error(self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.column, message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(Vec<u8>),
    Punct(char),
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: Pos,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            pos: Pos::default(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '#' {
                while !matches!(self.bump(), Some('\n') | None) {}
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn tokens(mut self) -> Result<Vec<(Pos, Token)>, ParseError> {
        let mut tokens: Vec<(Pos, Token)> = Vec::new();
        loop {
            self.skip_trivia();
            let pos = self.pos;
            let Some(&c) = self.chars.peek() else {
                return Ok(tokens);
            };
            let token = match c {
                '{' | '}' | '<' | '>' | '[' | ']' | ':' | ',' | ';' | '-' => {
                    self.bump();
                    Token::Punct(c)
                }
                '"' | '\'' => {
                    let s = self.string()?;
                    // Adjacent literals form one string.
                    if let Some((_, Token::Str(prev))) = tokens.last_mut() {
                        prev.extend(s);
                        continue;
                    }
                    Token::Str(s)
                }
                c if c.is_ascii_digit() || c == '.' => Token::Number(self.word()),
                c if c.is_ascii_alphabetic() || c == '_' => Token::Ident(self.word()),
                c => return Err(pos.error(format!("unexpected character {c:?}"))),
            };
            tokens.push((pos, token));
        }
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && word.ends_with(&['e', 'E'][..])
                && word.starts_with(|c: char| c.is_ascii_digit() || c == '.')
                && !word.starts_with("0x");
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn string(&mut self) -> Result<Vec<u8>, ParseError> {
        let start = self.pos;
        let quote = self.bump();
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(start.error("unterminated string")),
                Some(c) if Some(c) == quote => return Ok(out),
                Some('\\') => self.escape(&mut out)?,
                Some(c) => {
                    let mut buf = [0; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn digits(&mut self, radix: u32, max: usize) -> u32 {
        let mut value = 0;
        for _ in 0..max {
            match self.chars.peek().and_then(|c| c.to_digit(radix)) {
                Some(d) => {
                    value = value * radix + d;
                    self.bump();
                }
                None => break,
            }
        }
        value
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> Result<(), ParseError> {
        let pos = self.pos;
        let c = self
            .bump()
            .ok_or_else(|| pos.error("unterminated escape sequence"))?;
        match c {
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'v' => out.push(0x0b),
            '\\' | '\'' | '"' | '?' => out.push(c as u8),
            '0'..='7' => {
                let value = (c as u32 - '0' as u32) * 8u32.pow(self.octal_len()) + self.digits(8, 2);
                let byte = u8::try_from(value)
                    .map_err(|_| pos.error("octal escape out of range"))?;
                out.push(byte);
            }
            'x' | 'X' => {
                if !self.chars.peek().map_or(false, |c| c.is_ascii_hexdigit()) {
                    return Err(pos.error("expected hex digits after \\x"));
                }
                out.push(self.digits(16, 2) as u8);
            }
            'u' | 'U' => {
                let len = if c == 'u' { 4 } else { 8 };
                let ch = char::from_u32(self.digits(16, len))
                    .ok_or_else(|| pos.error("invalid unicode escape"))?;
                let mut buf = [0; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            c => return Err(pos.error(format!("unknown escape sequence \\{c}"))),
        }
        Ok(())
    }

    /// Number of octal digits (at most two) following the first one.
    fn octal_len(&self) -> u32 {
        self.chars
            .clone()
            .take(2)
            .take_while(|c| ('0'..='7').contains(c))
            .count() as u32
    }
}

// Parsing into untyped fields

enum FieldValue {
    Scalar(Token),
    Message(Vec<Field>),
}

struct Field {
    name: String,
    pos: Pos,
    value: FieldValue,
}

struct Parser {
    tokens: Vec<(Pos, Token)>,
    idx: usize,
    depth: usize,
    end: Pos,
}

impl Parser {
    fn pos(&self) -> Pos {
        self.tokens.get(self.idx).map_or(self.end, |(pos, _)| *pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(Pos, Token), ParseError> {
        let token = self
            .tokens
            .get(self.idx)
            .cloned()
            .ok_or_else(|| self.end.error("unexpected end of input"))?;
        self.idx += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: char) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn open(&mut self) -> Option<char> {
        if self.eat('{') {
            Some('}')
        } else if self.eat('<') {
            Some('>')
        } else {
            None
        }
    }

    fn message(&mut self, close: char) -> Result<Vec<Field>, ParseError> {
        if self.depth == MAX_DEPTH {
            return Err(self
                .pos()
                .error(format!("messages nested deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let fields = self.fields(Some(close));
        self.depth -= 1;
        fields
    }

    fn fields(&mut self, close: Option<char>) -> Result<Vec<Field>, ParseError> {
        let mut fields = Vec::new();
        loop {
            match (self.peek(), close) {
                (None, None) => return Ok(fields),
                (None, Some(close)) => {
                    return Err(self.pos().error(format!("expected '{close}'")))
                }
                (Some(Token::Punct(c)), Some(close)) if *c == close => {
                    self.idx += 1;
                    return Ok(fields);
                }
                _ => {}
            }
            self.field(&mut fields)?;
            let _ = self.eat(',') || self.eat(';');
        }
    }

    fn field(&mut self, out: &mut Vec<Field>) -> Result<(), ParseError> {
        let (pos, token) = self.next()?;
        let Token::Ident(name) = token else {
            return Err(pos.error("expected a field name"));
        };
        let colon = self.eat(':');

        if self.eat('[') {
            if !colon {
                return Err(pos.error(format!("expected ':' before list of {name}")));
            }
            if self.eat(']') {
                return Ok(());
            }
            loop {
                let value = self.value()?;
                out.push(Field {
                    name: name.clone(),
                    pos,
                    value,
                });
                if self.eat(']') {
                    return Ok(());
                }
                if !self.eat(',') {
                    return Err(self.pos().error("expected ',' or ']'"));
                }
            }
        }

        let value = match self.open() {
            Some(close) => FieldValue::Message(self.message(close)?),
            None if colon => self.scalar()?,
            None => return Err(self.pos().error(format!("expected ':' or '{{' after {name}"))),
        };
        out.push(Field { name, pos, value });
        Ok(())
    }

    fn value(&mut self) -> Result<FieldValue, ParseError> {
        match self.open() {
            Some(close) => Ok(FieldValue::Message(self.message(close)?)),
            None => self.scalar(),
        }
    }

    fn scalar(&mut self) -> Result<FieldValue, ParseError> {
        let negative = self.eat('-');
        let (pos, token) = self.next()?;
        let token = match token {
            Token::Number(n) if negative => Token::Number(format!("-{n}")),
            Token::Ident(id) if negative => Token::Ident(format!("-{id}")),
            token @ (Token::Number(_) | Token::Ident(_)) => token,
            token @ Token::Str(_) if !negative => token,
            _ => return Err(pos.error("expected a value")),
        };
        Ok(FieldValue::Scalar(token))
    }
}

fn parse_int(s: &str) -> Option<i128> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, s),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i128::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

fn parse_float(s: &str) -> Option<f64> {
    let lower = s.to_ascii_lowercase();
    let (negative, body) = match lower.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, lower.as_str()),
    };
    let value = match body {
        "inf" | "infinity" => f64::INFINITY,
        "nan" => f64::NAN,
        _ if body.starts_with("0x") => parse_int(body)? as f64,
        _ => body.strip_suffix('f').unwrap_or(body).parse().ok()?,
    };
    Some(if negative { -value } else { value })
}

impl Field {
    fn unknown(&self) -> ParseError {
        self.pos.error(format!("unknown field {}", self.name))
    }

    fn message(self) -> Result<Vec<Field>, ParseError> {
        match self.value {
            FieldValue::Message(fields) => Ok(fields),
            FieldValue::Scalar(_) => Err(self
                .pos
                .error(format!("field {} expects a message", self.name))),
        }
    }

    fn token(&self) -> Result<&Token, ParseError> {
        match &self.value {
            FieldValue::Scalar(token) => Ok(token),
            FieldValue::Message(_) => Err(self
                .pos
                .error(format!("field {} expects a scalar", self.name))),
        }
    }

    fn invalid(&self, what: &str) -> ParseError {
        self.pos
            .error(format!("field {} expects {what}", self.name))
    }

    fn bytes(&self) -> Result<Vec<u8>, ParseError> {
        match self.token()? {
            Token::Str(s) => Ok(s.clone()),
            _ => Err(self.invalid("a string")),
        }
    }

    fn string(&self) -> Result<String, ParseError> {
        String::from_utf8(self.bytes()?).map_err(|_| self.invalid("valid UTF-8"))
    }

    fn int<T: TryFrom<i128>>(&self) -> Result<T, ParseError> {
        match self.token()? {
            Token::Number(n) => parse_int(n)
                .and_then(|v| T::try_from(v).ok())
                .ok_or_else(|| self.invalid("an integer in range")),
            _ => Err(self.invalid("an integer")),
        }
    }

    fn float(&self) -> Result<f64, ParseError> {
        match self.token()? {
            Token::Number(s) | Token::Ident(s) => {
                parse_float(s).ok_or_else(|| self.invalid("a number"))
            }
            Token::Str(_) | Token::Punct(_) => Err(self.invalid("a number")),
        }
    }

    fn boolean(&self) -> Result<bool, ParseError> {
        match self.token()? {
            Token::Ident(s) => match s.as_str() {
                "true" | "True" | "t" => Ok(true),
                "false" | "False" | "f" => Ok(false),
                _ => Err(self.invalid("a boolean")),
            },
            Token::Number(s) if s == "1" => Ok(true),
            Token::Number(s) if s == "0" => Ok(false),
            _ => Err(self.invalid("a boolean")),
        }
    }

    fn data_type(&self) -> Result<i32, ParseError> {
        match self.token()? {
            Token::Ident(name) => DataType::from_name(name)
                .map(|ty| ty as i32)
                .ok_or_else(|| self.pos.error(format!("unknown data type {name}"))),
            Token::Number(_) => self.int(),
            _ => Err(self.invalid("a data type")),
        }
    }

    fn full_type_id(&self) -> Result<i32, ParseError> {
        match self.token()? {
            Token::Ident(name) => full_type_from_name(name)
                .ok_or_else(|| self.pos.error(format!("unknown full type id {name}"))),
            Token::Number(_) => self.int(),
            _ => Err(self.invalid("a full type id")),
        }
    }
}

// Building typed messages

fn graph_def(fields: Vec<Field>) -> Result<GraphDef, ParseError> {
    let mut graph = GraphDef::default();
    for f in fields {
        match f.name.as_str() {
            "node" => graph.node.push(node_def(f.message()?)?),
            "versions" => graph.versions = Some(version_def(f.message()?)?),
            "version" => graph.version = f.int()?,
            "library" => graph.library = Some(function_library(f.message()?)?),
            "debug_info" => graph.debug_info = Some(debug_info(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(graph)
}

fn version_def(fields: Vec<Field>) -> Result<VersionDef, ParseError> {
    let mut versions = VersionDef::default();
    for f in fields {
        match f.name.as_str() {
            "producer" => versions.producer = f.int()?,
            "min_consumer" => versions.min_consumer = f.int()?,
            "bad_consumers" => versions.bad_consumers.push(f.int()?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(versions)
}

fn node_def(fields: Vec<Field>) -> Result<NodeDef, ParseError> {
    let mut node = NodeDef::default();
    for f in fields {
        match f.name.as_str() {
            "name" => node.name = f.string()?,
            "op" => node.op = f.string()?,
            "input" => node.input.push(f.string()?),
            "device" => node.device = f.string()?,
            "attr" => attr_entry(f.message()?, &mut node.attr)?,
            "experimental_debug_info" => {
                let mut info = ExperimentalDebugInfo::default();
                for f in f.message()? {
                    match f.name.as_str() {
                        "original_node_names" => info.original_node_names.push(f.string()?),
                        "original_func_names" => info.original_func_names.push(f.string()?),
                        _ => return Err(f.unknown()),
                    }
                }
                node.experimental_debug_info = Some(info);
            }
            "experimental_type" => node.experimental_type = Some(full_type(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(node)
}

/// Reads the `key` and `value` of one map entry.
fn map_entry<K: Default, V: Default>(
    fields: Vec<Field>,
    key: impl Fn(&Field) -> Result<K, ParseError>,
    value: impl Fn(Field) -> Result<V, ParseError>,
) -> Result<(K, V), ParseError> {
    let mut entry = (K::default(), V::default());
    for f in fields {
        match f.name.as_str() {
            "key" => entry.0 = key(&f)?,
            "value" => entry.1 = value(f)?,
            _ => return Err(f.unknown()),
        }
    }
    Ok(entry)
}

fn attr_entry(fields: Vec<Field>, attrs: &mut AttrMap) -> Result<(), ParseError> {
    let (key, value) = map_entry(fields, Field::string, |f| attr_value(f.message()?))?;
    attrs.insert(key, value);
    Ok(())
}

fn string_entry(fields: Vec<Field>, map: &mut BTreeMap<String, String>) -> Result<(), ParseError> {
    let (key, value) = map_entry(fields, Field::string, |f| f.string())?;
    map.insert(key, value);
    Ok(())
}

fn attr_value(fields: Vec<Field>) -> Result<AttrValue, ParseError> {
    let mut attr = AttrValue::default();
    for f in fields {
        let value = match f.name.as_str() {
            "s" => AttrOneof::S(f.bytes()?),
            "i" => AttrOneof::I(f.int()?),
            "f" => AttrOneof::F(f.float()? as f32),
            "b" => AttrOneof::B(f.boolean()?),
            "type" => AttrOneof::Type(f.data_type()?),
            "shape" => AttrOneof::Shape(tensor_shape(f.message()?)?),
            "tensor" => AttrOneof::Tensor(tensor(f.message()?)?),
            "list" => AttrOneof::List(list_value(f.message()?)?),
            "func" => AttrOneof::Func(name_attr_list(f.message()?)?),
            "placeholder" => AttrOneof::Placeholder(f.string()?),
            _ => return Err(f.unknown()),
        };
        attr.value = Some(value);
    }
    Ok(attr)
}

fn list_value(fields: Vec<Field>) -> Result<ListValue, ParseError> {
    let mut list = ListValue::default();
    for f in fields {
        match f.name.as_str() {
            "s" => list.s.push(f.bytes()?),
            "i" => list.i.push(f.int()?),
            "f" => list.f.push(f.float()? as f32),
            "b" => list.b.push(f.boolean()?),
            "type" => list.r#type.push(f.data_type()?),
            "shape" => list.shape.push(tensor_shape(f.message()?)?),
            "tensor" => list.tensor.push(tensor(f.message()?)?),
            "func" => list.func.push(name_attr_list(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(list)
}

fn name_attr_list(fields: Vec<Field>) -> Result<NameAttrList, ParseError> {
    let mut func = NameAttrList::default();
    for f in fields {
        match f.name.as_str() {
            "name" => func.name = f.string()?,
            "attr" => attr_entry(f.message()?, &mut func.attr)?,
            _ => return Err(f.unknown()),
        }
    }
    Ok(func)
}

fn tensor_shape(fields: Vec<Field>) -> Result<TensorShapeProto, ParseError> {
    let mut shape = TensorShapeProto::default();
    for f in fields {
        match f.name.as_str() {
            "dim" => {
                let mut dim = Dim::default();
                for f in f.message()? {
                    match f.name.as_str() {
                        "size" => dim.size = f.int()?,
                        "name" => dim.name = f.string()?,
                        _ => return Err(f.unknown()),
                    }
                }
                shape.dim.push(dim);
            }
            "unknown_rank" => shape.unknown_rank = f.boolean()?,
            _ => return Err(f.unknown()),
        }
    }
    Ok(shape)
}

fn tensor(fields: Vec<Field>) -> Result<TensorProto, ParseError> {
    let mut t = TensorProto::default();
    for f in fields {
        match f.name.as_str() {
            "dtype" => t.dtype = f.data_type()?,
            "tensor_shape" => t.tensor_shape = Some(tensor_shape(f.message()?)?),
            "version_number" => t.version_number = f.int()?,
            "tensor_content" => t.tensor_content = f.bytes()?,
            "half_val" => t.half_val.push(f.int()?),
            "float_val" => t.float_val.push(f.float()? as f32),
            "double_val" => t.double_val.push(f.float()?),
            "int_val" => t.int_val.push(f.int()?),
            "string_val" => t.string_val.push(f.bytes()?),
            "scomplex_val" => t.scomplex_val.push(f.float()? as f32),
            "int64_val" => t.int64_val.push(f.int()?),
            "bool_val" => t.bool_val.push(f.boolean()?),
            "dcomplex_val" => t.dcomplex_val.push(f.float()?),
            "resource_handle_val" => t.resource_handle_val.push(resource_handle(f.message()?)?),
            "variant_val" => t.variant_val.push(variant(f.message()?)?),
            "uint32_val" => t.uint32_val.push(f.int()?),
            "uint64_val" => t.uint64_val.push(f.int()?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(t)
}

fn resource_handle(fields: Vec<Field>) -> Result<ResourceHandleProto, ParseError> {
    let mut handle = ResourceHandleProto::default();
    for f in fields {
        match f.name.as_str() {
            "device" => handle.device = f.string()?,
            "container" => handle.container = f.string()?,
            "name" => handle.name = f.string()?,
            "hash_code" => handle.hash_code = f.int()?,
            "maybe_type_name" => handle.maybe_type_name = f.string()?,
            "dtypes_and_shapes" => handle
                .dtypes_and_shapes
                .push(dtype_and_shape(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(handle)
}

fn dtype_and_shape(fields: Vec<Field>) -> Result<DtypeAndShape, ParseError> {
    let mut ds = DtypeAndShape::default();
    for f in fields {
        match f.name.as_str() {
            "dtype" => ds.dtype = f.data_type()?,
            "shape" => ds.shape = Some(tensor_shape(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(ds)
}

fn variant(fields: Vec<Field>) -> Result<VariantTensorDataProto, ParseError> {
    let mut v = VariantTensorDataProto::default();
    for f in fields {
        match f.name.as_str() {
            "type_name" => v.type_name = f.string()?,
            "metadata" => v.metadata = f.bytes()?,
            "tensors" => v.tensors.push(tensor(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(v)
}

fn full_type(fields: Vec<Field>) -> Result<FullTypeDef, ParseError> {
    let mut t = FullTypeDef::default();
    for f in fields {
        match f.name.as_str() {
            "type_id" => t.type_id = f.full_type_id()?,
            "args" => t.args.push(full_type(f.message()?)?),
            "s" => t.attr = Some(TypeAttr::S(f.string()?)),
            "i" => t.attr = Some(TypeAttr::I(f.int()?)),
            _ => return Err(f.unknown()),
        }
    }
    Ok(t)
}

fn function_library(fields: Vec<Field>) -> Result<FunctionDefLibrary, ParseError> {
    let mut library = FunctionDefLibrary::default();
    for f in fields {
        match f.name.as_str() {
            "function" => library.function.push(function_def(f.message()?)?),
            "gradient" => {
                let mut gradient = GradientDef::default();
                for f in f.message()? {
                    match f.name.as_str() {
                        "function_name" => gradient.function_name = f.string()?,
                        "gradient_func" => gradient.gradient_func = f.string()?,
                        _ => return Err(f.unknown()),
                    }
                }
                library.gradient.push(gradient);
            }
            "registered_gradients" => {
                let mut gradient = RegisteredGradient::default();
                for f in f.message()? {
                    match f.name.as_str() {
                        "gradient_func" => gradient.gradient_func = f.string()?,
                        "registered_op_type" => gradient.registered_op_type = f.string()?,
                        _ => return Err(f.unknown()),
                    }
                }
                library.registered_gradients.push(gradient);
            }
            _ => return Err(f.unknown()),
        }
    }
    Ok(library)
}

fn function_def(fields: Vec<Field>) -> Result<FunctionDef, ParseError> {
    let mut func = FunctionDef::default();
    for f in fields {
        match f.name.as_str() {
            "signature" => func.signature = Some(op_def(f.message()?)?),
            "attr" => attr_entry(f.message()?, &mut func.attr)?,
            "arg_attr" => {
                let (index, attrs) = map_entry(
                    f.message()?,
                    |f| f.int::<u32>(),
                    |f| {
                        let mut attrs = ArgAttrs::default();
                        for f in f.message()? {
                            match f.name.as_str() {
                                "attr" => attr_entry(f.message()?, &mut attrs.attr)?,
                                _ => return Err(f.unknown()),
                            }
                        }
                        Ok(attrs)
                    },
                )?;
                func.arg_attr.insert(index, attrs);
            }
            "resource_arg_unique_id" => {
                let (index, id) =
                    map_entry(f.message()?, |f| f.int::<u32>(), |f| f.int::<u32>())?;
                func.resource_arg_unique_id.insert(index, id);
            }
            "node_def" => func.node_def.push(node_def(f.message()?)?),
            "ret" => string_entry(f.message()?, &mut func.ret)?,
            "control_ret" => string_entry(f.message()?, &mut func.control_ret)?,
            _ => return Err(f.unknown()),
        }
    }
    Ok(func)
}

fn op_def(fields: Vec<Field>) -> Result<OpDef, ParseError> {
    let mut op = OpDef::default();
    for f in fields {
        match f.name.as_str() {
            "name" => op.name = f.string()?,
            "input_arg" => op.input_arg.push(arg_def(f.message()?)?),
            "output_arg" => op.output_arg.push(arg_def(f.message()?)?),
            "control_output" => op.control_output.push(f.string()?),
            "attr" => op.attr.push(attr_def(f.message()?)?),
            "deprecation" => {
                let mut deprecation = OpDeprecation::default();
                for f in f.message()? {
                    match f.name.as_str() {
                        "version" => deprecation.version = f.int()?,
                        "explanation" => deprecation.explanation = f.string()?,
                        _ => return Err(f.unknown()),
                    }
                }
                op.deprecation = Some(deprecation);
            }
            "summary" => op.summary = f.string()?,
            "description" => op.description = f.string()?,
            "is_commutative" => op.is_commutative = f.boolean()?,
            "is_aggregate" => op.is_aggregate = f.boolean()?,
            "is_stateful" => op.is_stateful = f.boolean()?,
            "allows_uninitialized_input" => op.allows_uninitialized_input = f.boolean()?,
            "is_distributed_communication" => op.is_distributed_communication = f.boolean()?,
            _ => return Err(f.unknown()),
        }
    }
    Ok(op)
}

fn arg_def(fields: Vec<Field>) -> Result<ArgDef, ParseError> {
    let mut arg = ArgDef::default();
    for f in fields {
        match f.name.as_str() {
            "name" => arg.name = f.string()?,
            "description" => arg.description = f.string()?,
            "type" => arg.r#type = f.data_type()?,
            "type_attr" => arg.type_attr = f.string()?,
            "number_attr" => arg.number_attr = f.string()?,
            "type_list_attr" => arg.type_list_attr = f.string()?,
            "handle_data" => arg.handle_data.push(dtype_and_shape(f.message()?)?),
            "is_ref" => arg.is_ref = f.boolean()?,
            "experimental_full_type" => {
                arg.experimental_full_type = Some(full_type(f.message()?)?)
            }
            _ => return Err(f.unknown()),
        }
    }
    Ok(arg)
}

fn attr_def(fields: Vec<Field>) -> Result<AttrDef, ParseError> {
    let mut attr = AttrDef::default();
    for f in fields {
        match f.name.as_str() {
            "name" => attr.name = f.string()?,
            "type" => attr.r#type = f.string()?,
            "default_value" => attr.default_value = Some(attr_value(f.message()?)?),
            "description" => attr.description = f.string()?,
            "has_minimum" => attr.has_minimum = f.boolean()?,
            "minimum" => attr.minimum = f.int()?,
            "allowed_values" => attr.allowed_values = Some(attr_value(f.message()?)?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(attr)
}

fn debug_info(fields: Vec<Field>) -> Result<GraphDebugInfo, ParseError> {
    let mut info = GraphDebugInfo::default();
    for f in fields {
        match f.name.as_str() {
            "files" => info.files.push(f.string()?),
            "frames_by_id" => {
                let (id, frame) =
                    map_entry(f.message()?, |f| f.int::<u64>(), |f| file_line_col(f.message()?))?;
                info.frames_by_id.insert(id, frame);
            }
            "traces_by_id" => {
                let (id, trace) =
                    map_entry(f.message()?, |f| f.int::<u64>(), |f| stack_trace(f.message()?))?;
                info.traces_by_id.insert(id, trace);
            }
            "traces" => {
                let (name, trace) =
                    map_entry(f.message()?, Field::string, |f| stack_trace(f.message()?))?;
                info.traces.insert(name, trace);
            }
            "name_to_trace_id" => {
                let (name, id) = map_entry(f.message()?, Field::string, |f| f.int::<u64>())?;
                info.name_to_trace_id.insert(name, id);
            }
            _ => return Err(f.unknown()),
        }
    }
    Ok(info)
}

fn file_line_col(fields: Vec<Field>) -> Result<FileLineCol, ParseError> {
    let mut frame = FileLineCol::default();
    for f in fields {
        match f.name.as_str() {
            "file_index" => frame.file_index = Some(f.int()?),
            "line" => frame.line = Some(f.int()?),
            "col" => frame.col = Some(f.int()?),
            "func" => frame.func = Some(f.string()?),
            "code" => frame.code = Some(f.string()?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(frame)
}

fn stack_trace(fields: Vec<Field>) -> Result<StackTrace, ParseError> {
    let mut trace = StackTrace::default();
    for f in fields {
        match f.name.as_str() {
            "file_line_cols" => trace.file_line_cols.push(file_line_col(f.message()?)?),
            "frame_id" => trace.frame_id.push(f.int()?),
            _ => return Err(f.unknown()),
        }
    }
    Ok(trace)
}

// Printing

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

fn escape(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => s.push_str("\\n"),
            b'\r' => s.push_str("\\r"),
            b'\t' => s.push_str("\\t"),
            b'"' => s.push_str("\\\""),
            b'\'' => s.push_str("\\'"),
            b'\\' => s.push_str("\\\\"),
            0x20..=0x7e => s.push(b as char),
            _ => s.push_str(&format!("\\{b:03o}")),
        }
    }
    s
}

impl Printer {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(&fmt::format(args));
        self.out.push('\n');
    }

    fn open(&mut self, name: &str) {
        self.line(format_args!("{name} {{"));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth -= 1;
        self.line(format_args!("}}"));
    }

    fn message(&mut self, name: &str, body: impl FnOnce(&mut Self)) {
        self.open(name);
        body(self);
        self.close();
    }

    fn entry(&mut self, name: &str, key: impl FnOnce(&mut Self), value: impl FnOnce(&mut Self)) {
        self.open(name);
        key(self);
        value(self);
        self.close();
    }

    fn string(&mut self, name: &str, value: &str) {
        if !value.is_empty() {
            self.bytes(name, value.as_bytes());
        }
    }

    fn nonzero<T: Default + PartialEq + fmt::Display>(&mut self, name: &str, value: T) {
        if value != T::default() {
            self.number(name, value);
        }
    }

    fn string_map(&mut self, name: &str, map: &BTreeMap<String, String>) {
        for (key, value) in map {
            self.entry(
                name,
                |p| p.bytes("key", key.as_bytes()),
                |p| p.bytes("value", value.as_bytes()),
            );
        }
    }

    fn bytes(&mut self, name: &str, value: &[u8]) {
        self.line(format_args!("{name}: \"{}\"", escape(value)));
    }

    fn number(&mut self, name: &str, value: impl fmt::Display) {
        self.line(format_args!("{name}: {value}"));
    }

    fn float<F: Into<f64> + fmt::Display + Copy>(&mut self, name: &str, value: F) {
        let v: f64 = value.into();
        if v.is_nan() {
            self.number(name, "nan");
        } else if v.is_infinite() {
            self.number(name, if v > 0.0 { "inf" } else { "-inf" });
        } else {
            self.number(name, value);
        }
    }

    fn data_type(&mut self, name: &str, value: i32) {
        self.number(name, data_type_name(value));
    }

    fn node_def(&mut self, node: &NodeDef) {
        if !node.name.is_empty() {
            self.bytes("name", node.name.as_bytes());
        }
        if !node.op.is_empty() {
            self.bytes("op", node.op.as_bytes());
        }
        for input in &node.input {
            self.bytes("input", input.as_bytes());
        }
        if !node.device.is_empty() {
            self.bytes("device", node.device.as_bytes());
        }
        self.attr_map(&node.attr);
        if let Some(info) = &node.experimental_debug_info {
            self.open("experimental_debug_info");
            for name in &info.original_node_names {
                self.bytes("original_node_names", name.as_bytes());
            }
            for name in &info.original_func_names {
                self.bytes("original_func_names", name.as_bytes());
            }
            self.close();
        }
        if let Some(ty) = &node.experimental_type {
            self.message("experimental_type", |p| p.full_type(ty));
        }
    }

    fn attr_map(&mut self, attrs: &AttrMap) {
        for (key, value) in attrs {
            self.open("attr");
            self.bytes("key", key.as_bytes());
            self.open("value");
            self.attr_value(value);
            self.close();
            self.close();
        }
    }

    fn attr_value(&mut self, attr: &AttrValue) {
        match &attr.value {
            None => {}
            Some(AttrOneof::S(s)) => self.bytes("s", s),
            Some(AttrOneof::I(i)) => self.number("i", i),
            Some(AttrOneof::F(f)) => self.float("f", *f),
            Some(AttrOneof::B(b)) => self.number("b", b),
            Some(AttrOneof::Type(ty)) => self.data_type("type", *ty),
            Some(AttrOneof::Shape(shape)) => {
                self.open("shape");
                self.tensor_shape(shape);
                self.close();
            }
            Some(AttrOneof::Tensor(t)) => {
                self.open("tensor");
                self.tensor(t);
                self.close();
            }
            Some(AttrOneof::List(list)) => {
                self.open("list");
                self.list_value(list);
                self.close();
            }
            Some(AttrOneof::Func(func)) => {
                self.open("func");
                self.name_attr_list(func);
                self.close();
            }
            Some(AttrOneof::Placeholder(p)) => self.bytes("placeholder", p.as_bytes()),
        }
    }

    fn list_value(&mut self, list: &ListValue) {
        for s in &list.s {
            self.bytes("s", s);
        }
        for i in &list.i {
            self.number("i", i);
        }
        for f in &list.f {
            self.float("f", *f);
        }
        for b in &list.b {
            self.number("b", b);
        }
        for ty in &list.r#type {
            self.data_type("type", *ty);
        }
        for shape in &list.shape {
            self.open("shape");
            self.tensor_shape(shape);
            self.close();
        }
        for t in &list.tensor {
            self.open("tensor");
            self.tensor(t);
            self.close();
        }
        for func in &list.func {
            self.open("func");
            self.name_attr_list(func);
            self.close();
        }
    }

    fn name_attr_list(&mut self, func: &NameAttrList) {
        if !func.name.is_empty() {
            self.bytes("name", func.name.as_bytes());
        }
        self.attr_map(&func.attr);
    }

    fn tensor_shape(&mut self, shape: &TensorShapeProto) {
        for dim in &shape.dim {
            self.open("dim");
            if dim.size != 0 {
                self.number("size", dim.size);
            }
            if !dim.name.is_empty() {
                self.bytes("name", dim.name.as_bytes());
            }
            self.close();
        }
        if shape.unknown_rank {
            self.number("unknown_rank", true);
        }
    }

    fn tensor(&mut self, t: &TensorProto) {
        if t.dtype != 0 {
            self.data_type("dtype", t.dtype);
        }
        if let Some(shape) = &t.tensor_shape {
            self.open("tensor_shape");
            self.tensor_shape(shape);
            self.close();
        }
        if t.version_number != 0 {
            self.number("version_number", t.version_number);
        }
        if !t.tensor_content.is_empty() {
            self.bytes("tensor_content", &t.tensor_content);
        }
        for v in &t.float_val {
            self.float("float_val", *v);
        }
        for v in &t.double_val {
            self.float("double_val", *v);
        }
        for v in &t.int_val {
            self.number("int_val", v);
        }
        for v in &t.string_val {
            self.bytes("string_val", v);
        }
        for v in &t.scomplex_val {
            self.float("scomplex_val", *v);
        }
        for v in &t.int64_val {
            self.number("int64_val", v);
        }
        for v in &t.bool_val {
            self.number("bool_val", v);
        }
        for v in &t.dcomplex_val {
            self.float("dcomplex_val", *v);
        }
        for v in &t.half_val {
            self.number("half_val", v);
        }
        for handle in &t.resource_handle_val {
            self.message("resource_handle_val", |p| p.resource_handle(handle));
        }
        for v in &t.variant_val {
            self.message("variant_val", |p| p.variant(v));
        }
        for v in &t.uint32_val {
            self.number("uint32_val", v);
        }
        for v in &t.uint64_val {
            self.number("uint64_val", v);
        }
    }

    fn version_def(&mut self, versions: &VersionDef) {
        if versions.producer != 0 {
            self.number("producer", versions.producer);
        }
        if versions.min_consumer != 0 {
            self.number("min_consumer", versions.min_consumer);
        }
        for v in &versions.bad_consumers {
            self.number("bad_consumers", v);
        }
    }

    fn resource_handle(&mut self, handle: &ResourceHandleProto) {
        self.string("device", &handle.device);
        self.string("container", &handle.container);
        self.string("name", &handle.name);
        self.nonzero("hash_code", handle.hash_code);
        self.string("maybe_type_name", &handle.maybe_type_name);
        for ds in &handle.dtypes_and_shapes {
            self.message("dtypes_and_shapes", |p| p.dtype_and_shape(ds));
        }
    }

    fn dtype_and_shape(&mut self, ds: &DtypeAndShape) {
        if ds.dtype != 0 {
            self.data_type("dtype", ds.dtype);
        }
        if let Some(shape) = &ds.shape {
            self.message("shape", |p| p.tensor_shape(shape));
        }
    }

    fn variant(&mut self, v: &VariantTensorDataProto) {
        self.string("type_name", &v.type_name);
        if !v.metadata.is_empty() {
            self.bytes("metadata", &v.metadata);
        }
        for t in &v.tensors {
            self.message("tensors", |p| p.tensor(t));
        }
    }

    fn full_type(&mut self, t: &FullTypeDef) {
        if t.type_id != 0 {
            self.number("type_id", full_type_name(t.type_id));
        }
        for arg in &t.args {
            self.message("args", |p| p.full_type(arg));
        }
        match &t.attr {
            None => {}
            Some(TypeAttr::S(s)) => self.bytes("s", s.as_bytes()),
            Some(TypeAttr::I(i)) => self.number("i", i),
        }
    }

    fn library(&mut self, library: &FunctionDefLibrary) {
        for func in &library.function {
            self.message("function", |p| p.function_def(func));
        }
        for gradient in &library.gradient {
            self.message("gradient", |p| {
                p.string("function_name", &gradient.function_name);
                p.string("gradient_func", &gradient.gradient_func);
            });
        }
        for gradient in &library.registered_gradients {
            self.message("registered_gradients", |p| {
                p.string("gradient_func", &gradient.gradient_func);
                p.string("registered_op_type", &gradient.registered_op_type);
            });
        }
    }

    fn function_def(&mut self, func: &FunctionDef) {
        if let Some(signature) = &func.signature {
            self.message("signature", |p| p.op_def(signature));
        }
        for node in &func.node_def {
            self.message("node_def", |p| p.node_def(node));
        }
        self.string_map("ret", &func.ret);
        self.attr_map(&func.attr);
        self.string_map("control_ret", &func.control_ret);
        for (index, attrs) in &func.arg_attr {
            self.entry(
                "arg_attr",
                |p| p.number("key", index),
                |p| p.message("value", |p| p.attr_map(&attrs.attr)),
            );
        }
        for (index, id) in &func.resource_arg_unique_id {
            self.entry(
                "resource_arg_unique_id",
                |p| p.number("key", index),
                |p| p.number("value", id),
            );
        }
    }

    fn op_def(&mut self, op: &OpDef) {
        self.string("name", &op.name);
        for arg in &op.input_arg {
            self.message("input_arg", |p| p.arg_def(arg));
        }
        for arg in &op.output_arg {
            self.message("output_arg", |p| p.arg_def(arg));
        }
        for attr in &op.attr {
            self.message("attr", |p| p.attr_def(attr));
        }
        self.string("summary", &op.summary);
        self.string("description", &op.description);
        if let Some(deprecation) = &op.deprecation {
            self.message("deprecation", |p| {
                p.nonzero("version", deprecation.version);
                p.string("explanation", &deprecation.explanation);
            });
        }
        self.nonzero("is_aggregate", op.is_aggregate);
        self.nonzero("is_stateful", op.is_stateful);
        self.nonzero("is_commutative", op.is_commutative);
        self.nonzero("allows_uninitialized_input", op.allows_uninitialized_input);
        for output in &op.control_output {
            self.bytes("control_output", output.as_bytes());
        }
        self.nonzero(
            "is_distributed_communication",
            op.is_distributed_communication,
        );
    }

    fn arg_def(&mut self, arg: &ArgDef) {
        self.string("name", &arg.name);
        self.string("description", &arg.description);
        if arg.r#type != 0 {
            self.data_type("type", arg.r#type);
        }
        self.string("type_attr", &arg.type_attr);
        self.string("number_attr", &arg.number_attr);
        self.string("type_list_attr", &arg.type_list_attr);
        for ds in &arg.handle_data {
            self.message("handle_data", |p| p.dtype_and_shape(ds));
        }
        self.nonzero("is_ref", arg.is_ref);
        if let Some(ty) = &arg.experimental_full_type {
            self.message("experimental_full_type", |p| p.full_type(ty));
        }
    }

    fn attr_def(&mut self, attr: &AttrDef) {
        self.string("name", &attr.name);
        self.string("type", &attr.r#type);
        if let Some(value) = &attr.default_value {
            self.message("default_value", |p| p.attr_value(value));
        }
        self.string("description", &attr.description);
        self.nonzero("has_minimum", attr.has_minimum);
        self.nonzero("minimum", attr.minimum);
        if let Some(values) = &attr.allowed_values {
            self.message("allowed_values", |p| p.attr_value(values));
        }
    }

    fn debug_info(&mut self, info: &GraphDebugInfo) {
        for file in &info.files {
            self.bytes("files", file.as_bytes());
        }
        for (name, trace) in &info.traces {
            self.entry(
                "traces",
                |p| p.bytes("key", name.as_bytes()),
                |p| p.message("value", |p| p.stack_trace(trace)),
            );
        }
        for (id, frame) in &info.frames_by_id {
            self.entry(
                "frames_by_id",
                |p| p.number("key", id),
                |p| p.message("value", |p| p.file_line_col(frame)),
            );
        }
        for (name, id) in &info.name_to_trace_id {
            self.entry(
                "name_to_trace_id",
                |p| p.bytes("key", name.as_bytes()),
                |p| p.number("value", id),
            );
        }
        for (id, trace) in &info.traces_by_id {
            self.entry(
                "traces_by_id",
                |p| p.number("key", id),
                |p| p.message("value", |p| p.stack_trace(trace)),
            );
        }
    }

    fn file_line_col(&mut self, frame: &FileLineCol) {
        if let Some(v) = frame.file_index {
            self.number("file_index", v);
        }
        if let Some(v) = frame.line {
            self.number("line", v);
        }
        if let Some(v) = frame.col {
            self.number("col", v);
        }
        if let Some(v) = &frame.func {
            self.bytes("func", v.as_bytes());
        }
        if let Some(v) = &frame.code {
            self.bytes("code", v.as_bytes());
        }
    }

    fn stack_trace(&mut self, trace: &StackTrace) {
        for frame in &trace.file_line_cols {
            self.message("file_line_cols", |p| p.file_line_col(frame));
        }
        for id in &trace.frame_id {
            self.number("frame_id", id);
        }
    }
}

#[test]
fn print_constant_node() {
    let mut graph = GraphDef::default();
    graph.node.push(NodeDef::constant_from_proto(
        "c",
        TensorProto {
            dtype: DataType::DtInt32 as i32,
            tensor_shape: Some(crate::attr::shape_proto(&[2])),
            tensor_content: vec![0, 0, 0, 0, 1, 0, 0, 0],
            ..Default::default()
        },
    ));
    graph.versions = Some(VersionDef {
        producer: 808,
        ..Default::default()
    });

    insta::assert_snapshot!(to_string(&graph), @r###"
    node {
      name: "c"
      op: "Const"
      attr {
        key: "dtype"
        value {
          type: DT_INT32
        }
      }
      attr {
        key: "value"
        value {
          tensor {
            dtype: DT_INT32
            tensor_shape {
              dim {
                size: 2
              }
            }
            tensor_content: "\000\000\000\000\001\000\000\000"
          }
        }
      }
    }
    versions {
      producer: 808
    }
    "###);
}

#[test]
fn parse_loose_syntax() {
    let graph = parse(
        r#"
        # a comment
        node: < name: 'a' op: "Const" attr { key: "value" value { tensor {
            dtype: 1 float_val: [1.5, -inf, 2e3f] } } } >,
        node { name: "b" "c" op: "Pack"; input: ["a", "a:1"] device: "\x2fcpu" }
        node { name: "q\"\101\n" attr { key: "l" value { list { i: [0x10, -3] b: [t, False] type: DT_BOOL } } } }
        versions { producer: 12 bad_consumers: 3 bad_consumers: 4 }
        "#,
    )
    .unwrap();

    assert_eq!(graph.node.len(), 3);
    let t = graph.node[0].attr["value"].tensor().unwrap();
    assert_eq!(t.dtype, DataType::DtFloat as i32);
    assert_eq!(t.float_val[0], 1.5);
    assert_eq!(t.float_val[1], f32::NEG_INFINITY);
    assert_eq!(t.float_val[2], 2000.0);

    assert_eq!(graph.node[1].name, "bc");
    assert_eq!(graph.node[1].input, ["a", "a:1"]);
    assert_eq!(graph.node[1].device, "/cpu");

    assert_eq!(graph.node[2].name, "q\"A\n");
    let list = graph.node[2].attr["l"].list().unwrap();
    assert_eq!(list.i, [16, -3]);
    assert_eq!(list.b, [true, false]);
    assert_eq!(list.r#type, [DataType::DtBool as i32]);

    let versions = graph.versions.unwrap();
    assert_eq!(versions.producer, 12);
    assert_eq!(versions.bad_consumers, [3, 4]);
}

#[test]
fn parse_errors_have_positions() {
    let err = parse("node {\n  name: \"a\"\n  bogus: 1\n}").unwrap_err();
    assert_eq!((err.line, err.column), (3, 3));
    assert!(err.message.contains("bogus"));

    let err = parse("node { name: \"a\"").unwrap_err();
    assert!(err.message.contains("'}'"));

    assert!(parse("node { name: 3 }").is_err());
    assert!(parse("versions { producer: 99999999999 }").is_err());
    assert!(parse("node { attr { key: \"t\" value { type: DT_NOPE } } }").is_err());
    assert!(parse("node { name: \"unterminated }").is_err());
    assert!(parse("library { function { bogus: 1 } }").is_err());
    assert!(parse("node { experimental_type { type_id: TFT_NOPE } }").is_err());
}

#[test]
fn deep_nesting_is_rejected() {
    // node and experimental_type, then nested full type arguments
    let nested = |depth: usize| {
        format!(
            "node {{ experimental_type {{ {}{}",
            "args { ".repeat(depth - 2),
            "} ".repeat(depth)
        )
    };
    assert!(parse(&nested(MAX_DEPTH)).is_ok());

    let err = parse(&nested(MAX_DEPTH + 1)).unwrap_err();
    assert!(err.message.contains("nested"));

    let err = parse(&"node {".repeat(200_000)).unwrap_err();
    assert!(err.message.contains("nested"));
}

#[test]
fn library_and_debug_info_round_trip() {
    let src = r#"
        node {
          name: "call"
          op: "f"
          experimental_type {
            type_id: TFT_PRODUCT
            args {
              type_id: TFT_TENSOR
              args {
                type_id: TFT_FLOAT
              }
            }
          }
        }
        library {
          function {
            signature {
              name: "f"
              output_arg {
                name: "y"
                type: DT_FLOAT
              }
              is_stateful: true
            }
            node_def {
              name: "c"
              op: "Const"
            }
            ret {
              key: "y"
              value: "c:output:0"
            }
            arg_attr {
              key: 0
              value {
                attr {
                  key: "_output_shapes"
                  value {
                    list {
                    }
                  }
                }
              }
            }
          }
          gradient {
            function_name: "f"
            gradient_func: "g"
          }
        }
        versions {
          producer: 1
        }
        debug_info {
          files: "model.py"
          frames_by_id {
            key: 18446744073709551615
            value {
              file_index: 0
              line: 12
            }
          }
          name_to_trace_id {
            key: "call@f"
            value: 7
          }
        }
    "#;
    let graph = parse(src).unwrap();
    let library = graph.library.as_ref().unwrap();
    assert_eq!(library.function[0].ret["y"], "c:output:0");
    assert!(library.function[0].signature.as_ref().unwrap().is_stateful);
    assert_eq!(library.gradient[0].gradient_func, "g");
    let info = graph.debug_info.as_ref().unwrap();
    assert_eq!(info.frames_by_id[&u64::MAX].file_index, Some(0));
    assert_eq!(info.name_to_trace_id["call@f"], 7);
    assert_eq!(
        graph.node[0].experimental_type.as_ref().unwrap().args[0].type_id,
        1000
    );

    let text = to_string(&graph);
    assert!(text.contains("file_index: 0"));
    assert!(text.contains("type_id: TFT_FLOAT"));
    assert_eq!(parse(&text).unwrap(), graph);
}

#[test]
fn escapes_round_trip() {
    let mut graph = GraphDef::default();
    graph.node.push(NodeDef::new("tab\there", "Op").with_attrs(AttrMap::from([(
        "s".to_string(),
        AttrValue::new(AttrOneof::S(vec![0, b'\'', b'\\', 0xff, b'x'])),
    )])));
    let text = to_string(&graph);
    assert!(text.contains(r#"name: "tab\there""#));
    assert!(text.contains(r#"s: "\000\'\\\377x""#));
    assert_eq!(parse(&text).unwrap(), graph);
}

#[test]
fn non_finite_floats() {
    let mut graph = GraphDef::default();
    graph.node.push(NodeDef::new("n", "Op").with_attrs(AttrMap::from([
        ("a".to_string(), AttrValue::from(f32::INFINITY)),
        ("b".to_string(), AttrValue::from(0.1f32)),
    ])));
    let text = to_string(&graph);
    assert!(text.contains("f: inf"));
    assert!(text.contains("f: 0.1"));
    let back = parse(&text).unwrap();
    assert_eq!(back.node[0].attr["a"].as_f32(), Some(f32::INFINITY));
    assert_eq!(back.node[0].attr["b"].as_f32(), Some(0.1));
}
