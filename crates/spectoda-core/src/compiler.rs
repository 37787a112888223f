//! TNGL compiler
//!
//! One pass over the token stream, emitting one tag per construct into a
//! [`Writer`]. Variables live on a declaration stack scoped by `{`/`}`:
//! entering a block records the stack depth, leaving truncates back to it.
//!
//! Unknown bare words that are neither keywords nor declared variables are
//! dropped with a warning instead of failing the compilation. Controllers
//! may then see a missing operand, so callers that need strictness should
//! check [`TnglCompiler::warnings`].

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::Writer;
use crate::constants::tngl;
use crate::tokenizer::{tokenize, Token, TokenKind};
use crate::types::{percentage_to_raw, Color, Label};
use crate::{Error, Result};

/// Default bytecode buffer size
pub const DEFAULT_CAPACITY: usize = 0xFFFF;

/// Address reserved for "no variable"
pub const VARIABLE_ADDRESS_NULL: u16 = 0x0000;
/// Address emitted for a reference to an undeclared variable
pub const VARIABLE_ADDRESS_UNKNOWN: u16 = 0xFFFF;

const PERCENTAGE_EPSILON: f64 = 1e-11;

/// Keyword to flag table
pub fn keyword_flag(word: &str) -> Option<u8> {
    let flag = match word {
        "setDrawing" => tngl::DRAWING_SET,
        "addDrawing" => tngl::DRAWING_ADD,
        "subDrawing" => tngl::DRAWING_SUB,
        "scaDrawing" => tngl::DRAWING_SCALE,
        "filDrawing" => tngl::DRAWING_FILTER,
        "setLayer" => tngl::LAYER_SET,
        "addLayer" => tngl::LAYER_ADD,
        "subLayer" => tngl::LAYER_SUB,
        "scaLayer" => tngl::LAYER_SCALE,
        "filLayer" => tngl::LAYER_FILTER,
        "scope" => tngl::SCOPE,
        "siftSegments" => tngl::SIFTER_SEGMENT,
        "siftCanvases" => tngl::SIFTER_CANVAS,
        "siftGroups" => tngl::SIFTER_GROUP,
        "interactive" => tngl::INTERACTIVE,
        "catchEvent" => tngl::EVENT_CATCHER,
        "defController" => tngl::DEFINE_CONTROLLER,
        "defSegment" => tngl::DEFINE_SEGMENT,
        "defCanvas" => tngl::DEFINE_CANVAS,
        "defMarks" => tngl::DEFINE_MARKS,
        "defAnimation" => tngl::DEFINE_ANIMATION,
        "defEmitter" => tngl::DEFINE_EMITTER,
        "animNone" => tngl::ANIMATION_NONE,
        "animFill" => tngl::ANIMATION_FILL,
        "animRainbow" => tngl::ANIMATION_RAINBOW,
        "animFade" => tngl::ANIMATION_FADE,
        "animProjectile" => tngl::ANIMATION_PROJECTILE,
        "animLoadingBar" => tngl::ANIMATION_LOADING,
        "animColorRoll" => tngl::ANIMATION_COLOR_ROLL,
        "animColorGradient2" => tngl::ANIMATION_COLOR_GRADIENT2,
        "animColorGradient3" => tngl::ANIMATION_COLOR_GRADIENT3,
        "animColorGradient4" => tngl::ANIMATION_COLOR_GRADIENT4,
        "animColorGradient5" => tngl::ANIMATION_COLOR_GRADIENT5,
        "animInlAni" => tngl::ANIMATION_INL_ANI,
        "animDefined" => tngl::ANIMATION_DEFINED,
        "modifyBrightness" => tngl::MODIFIER_BRIGHTNESS,
        "modifyTimeline" => tngl::MODIFIER_TIMELINE,
        "modifyFadeIn" => tngl::MODIFIER_FADE_IN,
        "modifyFadeOut" => tngl::MODIFIER_FADE_OUT,
        "modifyColorSwitch" => tngl::MODIFIER_SWITCH_COLORS,
        "modifyTimeLoop" => tngl::MODIFIER_TIME_LOOP,
        "modifyTimeScale" => tngl::MODIFIER_TIME_SCALE,
        "modifyTimeScaleSmoothed" => tngl::MODIFIER_TIME_SCALE_SMOOTHED,
        "modifyTimeChange" => tngl::MODIFIER_TIME_CHANGE,
        "modifyTimeSet" => tngl::MODIFIER_TIME_SET,
        "genLastEventParam" => tngl::GENERATOR_LAST_EVENT_VALUE,
        "genSmoothOut" => tngl::GENERATOR_SMOOTHOUT,
        "genLagValue" => tngl::GENERATOR_LAG_VALUE,
        "genSine" => tngl::GENERATOR_SINE,
        "genSaw" => tngl::GENERATOR_SAW,
        "genTriangle" => tngl::GENERATOR_TRIANGLE,
        "genSquare" => tngl::GENERATOR_SQUARE,
        "genPerlinNoise" => tngl::GENERATOR_PERLIN_NOISE,
        "addValues" => tngl::VARIABLE_ADD,
        "subValues" => tngl::VARIABLE_SUB,
        "mulValues" => tngl::VARIABLE_MUL,
        "divValues" => tngl::VARIABLE_DIV,
        "modValues" => tngl::VARIABLE_MOD,
        "scaValue" => tngl::VARIABLE_SCALE,
        "mapValue" => tngl::VARIABLE_MAP,
        "controller" => tngl::CONTROLLER,
        "segment" => tngl::SEGMENT,
        "slice" => tngl::SLICE,
        "port" => tngl::PORT,
        "canvas" => tngl::CANVAS,
        "marks" => tngl::MARKS,
        "setValue" => tngl::EVENT_SET_VALUE,
        "emitAs" => tngl::EVENT_EMIT_LOCAL,
        "randomChoice" => tngl::EVENT_RANDOM_CHOICE,
        "tuple" => tngl::TUPLE,
        _ => return None,
    };
    Some(flag)
}

/// Total milliseconds of a composite timestamp literal such as `1.2d+9h2m7.2s-123t`
pub fn parse_timestamp(literal: &str) -> f64 {
    let mut total = 0.0;
    let mut rest = literal.trim();

    while !rest.is_empty() {
        let number_len = rest
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '+' || c == '-'))))
            .map_or(rest.len(), |(i, _)| i);
        let (number, tail) = rest.split_at(number_len);

        let (scale, unit_len) = if tail.starts_with("ms") {
            (1.0, 2)
        } else {
            match tail.as_bytes().first() {
                Some(b'd') => (86_400_000.0, 1),
                Some(b'h') => (3_600_000.0, 1),
                Some(b'm') => (60_000.0, 1),
                Some(b's') => (1_000.0, 1),
                Some(b't') => (1.0, 1),
                _ => break,
            }
        };

        total += number.parse::<f64>().unwrap_or(0.0) * scale;
        rest = &tail[unit_len..];
    }

    total
}

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    address: u16,
}

/// One-pass TNGL to bytecode compiler
#[derive(Debug)]
pub struct TnglCompiler {
    writer: Writer,
    declarations: Vec<Declaration>,
    scope_depths: Vec<usize>,
    next_address: u16,
    warnings: Vec<String>,
}

impl Default for TnglCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TnglCompiler {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: Writer::new(capacity),
            declarations: Vec::new(),
            scope_depths: Vec::new(),
            next_address: VARIABLE_ADDRESS_NULL + 1,
            warnings: Vec::new(),
        }
    }

    /// Clear all state, keeping the buffer allocation
    pub fn reset(&mut self) {
        self.writer.reset();
        self.declarations.clear();
        self.scope_depths.clear();
        self.next_address = VARIABLE_ADDRESS_NULL + 1;
        self.warnings.clear();
    }

    /// Warnings produced by the last compilation
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Compile `source`, returning the bytecode terminated by `END_OF_TNGL_BYTES`
    pub fn compile(&mut self, source: &str) -> Result<Bytes> {
        self.reset();

        for token in tokenize(source) {
            self.compile_token(&token)?;
        }

        if !self.scope_depths.is_empty() {
            return Err(Error::Compilation {
                token: "{".to_string(),
                offset: source.len(),
                reason: format!("{} unclosed scope(s)", self.scope_depths.len()),
            });
        }

        self.writer.write_flag(tngl::END_OF_TNGL_BYTES)?;
        debug!("compiled {} bytes of TNGL into {} bytes", source.len(), self.writer.written());
        Ok(Bytes::copy_from_slice(self.writer.bytes()))
    }

    fn compile_token(&mut self, token: &Token) -> Result<()> {
        match token.kind {
            TokenKind::Comment | TokenKind::Whitespace | TokenKind::Connection => Ok(()),
            TokenKind::VariableDeclaration => self.compile_declaration(token),
            TokenKind::VariableReference => self.compile_reference(token),
            TokenKind::Color => self.compile_color(token),
            TokenKind::Infinity => {
                let flag = if token.text.starts_with('-') {
                    tngl::TIMESTAMP_MIN
                } else {
                    tngl::TIMESTAMP_MAX
                };
                self.writer.write_flag(flag)
            }
            TokenKind::String => {
                let text = token.text.trim_matches('"');
                self.writer.write_flag(tngl::STRING)?;
                self.writer.write_string(text, text.len())?;
                self.writer.write_flag(tngl::NONE)
            }
            TokenKind::Timestamp => self.compile_timestamp(parse_timestamp(&token.text)),
            TokenKind::Label => {
                let label = Label::new(&token.text[1..]);
                self.writer.write_flag(tngl::LABEL)?;
                self.writer.write_label(&label)
            }
            TokenKind::Char => {
                let byte = token.text.as_bytes().get(1).copied().unwrap_or(0);
                self.writer.write_u8(byte)
            }
            TokenKind::Byte => {
                let byte = u8::from_str_radix(&token.text[2..], 16)
                    .map_err(|e| compilation_error(token, e.to_string()))?;
                self.writer.write_u8(byte)
            }
            TokenKind::Pixels => {
                let count: i16 = token
                    .text
                    .trim_end_matches("px")
                    .parse()
                    .map_err(|_| compilation_error(token, "pixel count out of range"))?;
                self.writer.write_flag(tngl::PIXELS)?;
                self.writer.write_i16(count)
            }
            TokenKind::Percentage => {
                let percent: f64 = token
                    .text
                    .trim_end_matches('%')
                    .parse()
                    .map_err(|_| compilation_error(token, "invalid percentage"))?;
                self.compile_percentage(percent)
            }
            TokenKind::Float | TokenKind::Number => Err(compilation_error(
                token,
                "naked numbers are not allowed, use a typed literal (e.g. 1s, 50%, 10px)",
            )),
            TokenKind::Word => self.compile_word(token),
            TokenKind::Punctuation => self.compile_punctuation(token),
        }
    }

    fn compile_declaration(&mut self, token: &Token) -> Result<()> {
        let name = token
            .text
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| compilation_error(token, "missing variable name"))?;

        if self.next_address == VARIABLE_ADDRESS_UNKNOWN {
            return Err(compilation_error(token, "variable address space exhausted"));
        }
        let address = self.next_address;
        self.next_address += 1;

        self.declarations.push(Declaration {
            name: name.to_string(),
            address,
        });
        self.writer.write_flag(tngl::DECLARE_VARIABLE)?;
        self.writer.write_u16(address)
    }

    fn lookup(&self, name: &str) -> Option<u16> {
        self.declarations
            .iter()
            .rev()
            .find(|d| d.name == name)
            .map(|d| d.address)
    }

    fn compile_reference(&mut self, token: &Token) -> Result<()> {
        let name = &token.text[1..];
        let address = match self.lookup(name) {
            Some(address) => address,
            None => {
                self.warn(format!("reference to undeclared variable {name:?}"));
                VARIABLE_ADDRESS_UNKNOWN
            }
        };
        self.writer.write_flag(tngl::VALUE_ADDRESS)?;
        self.writer.write_u16(address)
    }

    fn compile_word(&mut self, token: &Token) -> Result<()> {
        if let Some(flag) = keyword_flag(&token.text) {
            return self.writer.write_flag(flag);
        }

        match self.lookup(&token.text) {
            Some(address) => {
                self.writer.write_flag(tngl::VARIABLE_READ)?;
                self.writer.write_u16(address)
            }
            None => {
                self.warn(format!("unknown word {:?} dropped", token.text));
                Ok(())
            }
        }
    }

    fn compile_punctuation(&mut self, token: &Token) -> Result<()> {
        match token.text.as_str() {
            "{" => {
                self.scope_depths.push(self.declarations.len());
                Ok(())
            }
            "}" => {
                let depth = self
                    .scope_depths
                    .pop()
                    .ok_or_else(|| compilation_error(token, "unbalanced closing brace"))?;
                self.declarations.truncate(depth);
                self.writer.write_flag(tngl::END_OF_SCOPE)
            }
            _ => Ok(()),
        }
    }

    fn compile_color(&mut self, token: &Token) -> Result<()> {
        let color =
            Color::from_hex(&token.text).map_err(|e| compilation_error(token, e.to_string()))?;
        match color {
            Color::WHITE => self.writer.write_flag(tngl::COLOR_WHITE),
            Color::BLACK => self.writer.write_flag(tngl::COLOR_BLACK),
            Color { r, g, b } => {
                self.writer.write_flag(tngl::COLOR)?;
                self.writer.write_u8(r)?;
                self.writer.write_u8(g)?;
                self.writer.write_u8(b)
            }
        }
    }

    fn compile_timestamp(&mut self, millis: f64) -> Result<()> {
        if millis >= f64::from(i32::MAX) {
            self.writer.write_flag(tngl::TIMESTAMP_MAX)
        } else if millis <= f64::from(i32::MIN) {
            self.writer.write_flag(tngl::TIMESTAMP_MIN)
        } else if millis.trunc() == 0.0 {
            self.writer.write_flag(tngl::TIMESTAMP_ZERO)
        } else {
            self.writer.write_flag(tngl::TIMESTAMP)?;
            self.writer.write_i32(millis.trunc() as i32)
        }
    }

    fn compile_percentage(&mut self, percent: f64) -> Result<()> {
        if percent.abs() < PERCENTAGE_EPSILON {
            return self.writer.write_flag(tngl::PERCENTAGE_ZERO);
        }
        if percent > 100.0 - PERCENTAGE_EPSILON {
            return self.writer.write_flag(tngl::PERCENTAGE_MAX);
        }
        if percent < -100.0 + PERCENTAGE_EPSILON {
            return self.writer.write_flag(tngl::PERCENTAGE_MIN);
        }
        self.writer.write_flag(tngl::PERCENTAGE)?;
        self.writer.write_i32(percentage_to_raw(percent))
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

fn compilation_error(token: &Token, reason: impl Into<String>) -> Error {
    Error::Compilation {
        token: token.text.clone(),
        offset: token.offset,
        reason: reason.into(),
    }
}

/// Compile TNGL source with a fresh compiler
pub fn compile(source: &str) -> Result<Bytes> {
    TnglCompiler::new().compile(source)
}
