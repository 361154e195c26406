//! Just enough of the Solidity ABI to talk to the step ledger.
//!
//! The ledger only ever takes addresses and small unsigned integers and only
//! ever returns a single unsigned integer, so the codec covers static
//! `address`, `uintN` and `bool` words and nothing else. Functions using other
//! types are skipped when an interface description is loaded.

use serde_json::Value;

use crate::error::AbiError;
use crate::types::{Address, keccak256};

/// Supported static ABI types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    Address,
    Uint(u16),
    Bool,
}

impl AbiType {
    pub fn parse(raw: &str) -> Result<Self, AbiError> {
        match raw.trim() {
            "address" => Ok(Self::Address),
            "bool" => Ok(Self::Bool),
            "uint" => Ok(Self::Uint(256)),
            other => {
                let bits = other
                    .strip_prefix("uint")
                    .and_then(|b| b.parse::<u16>().ok())
                    .filter(|b| *b >= 8 && *b <= 256 && b % 8 == 0)
                    .ok_or_else(|| AbiError::UnsupportedType(other.to_string()))?;
                Ok(Self::Uint(bits))
            }
        }
    }

    pub fn canonical(&self) -> String {
        match self {
            Self::Address => "address".to_string(),
            Self::Uint(bits) => format!("uint{}", bits),
            Self::Bool => "bool".to_string(),
        }
    }
}

/// A decoded or to-be-encoded argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u64),
    Bool(bool),
}

impl Token {
    fn matches(&self, ty: AbiType) -> bool {
        matches!(
            (self, ty),
            (Token::Address(_), AbiType::Address)
                | (Token::Uint(_), AbiType::Uint(_))
                | (Token::Bool(_), AbiType::Bool)
        )
    }

    fn to_word(self) -> [u8; 32] {
        match self {
            Token::Address(addr) => addr.to_word(),
            Token::Uint(value) => {
                let mut word = [0u8; 32];
                word[24..].copy_from_slice(&value.to_be_bytes());
                word
            }
            Token::Bool(flag) => {
                let mut word = [0u8; 32];
                word[31] = u8::from(flag);
                word
            }
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Token::Address(addr) => Some(*addr),
            _ => None,
        }
    }
}

/// A single function in the ledger's interface description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub inputs: Vec<AbiType>,
    pub outputs: Vec<AbiType>,
}

fn split_params(raw: &str) -> Result<Vec<AbiType>, AbiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|param| {
            let ty = param
                .split_whitespace()
                .next()
                .ok_or_else(|| AbiError::InvalidSignature(param.to_string()))?;
            AbiType::parse(ty)
        })
        .collect()
}

impl FunctionSignature {
    /// Parse a human-readable fragment such as
    /// `function getStepStatus(address wallet, uint8 step) view returns (uint8)`
    /// or a bare canonical form like `submitStep1()`.
    pub fn parse(fragment: &str) -> Result<Self, AbiError> {
        let invalid = || AbiError::InvalidSignature(fragment.to_string());
        let body = fragment.trim();
        let body = body.strip_prefix("function ").unwrap_or(body).trim();

        let open = body.find('(').ok_or_else(invalid)?;
        let name = body[..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid());
        }
        let close = body[open..].find(')').map(|i| i + open).ok_or_else(invalid)?;
        let inputs = split_params(&body[open + 1..close])?;

        let rest = &body[close + 1..];
        let outputs = match rest.find("returns") {
            Some(idx) => {
                let tail = rest[idx + "returns".len()..].trim();
                let tail = tail.strip_prefix('(').ok_or_else(invalid)?;
                let end = tail.find(')').ok_or_else(invalid)?;
                split_params(&tail[..end])?
            }
            None => Vec::new(),
        };

        Ok(Self {
            name: name.to_string(),
            inputs,
            outputs,
        })
    }

    /// Parse a JSON ABI entry (`{"type":"function","name":..,"inputs":[..]}`).
    pub fn from_json_entry(entry: &Value) -> Result<Option<Self>, AbiError> {
        if let Some(fragment) = entry.as_str() {
            if !fragment.trim_start().starts_with("function") {
                return Ok(None);
            }
            return Self::parse(fragment).map(Some);
        }
        let kind = entry.get("type").and_then(Value::as_str).unwrap_or("function");
        if kind != "function" {
            return Ok(None);
        }
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AbiError::InvalidSignature(entry.to_string()))?;
        let types = |key: &str| -> Result<Vec<AbiType>, AbiError> {
            entry
                .get(key)
                .and_then(Value::as_array)
                .map(|params| {
                    params
                        .iter()
                        .map(|p| {
                            p.get("type")
                                .and_then(Value::as_str)
                                .ok_or_else(|| AbiError::InvalidSignature(p.to_string()))
                                .and_then(AbiType::parse)
                        })
                        .collect()
                })
                .unwrap_or_else(|| Ok(Vec::new()))
        };
        Ok(Some(Self {
            name: name.to_string(),
            inputs: types("inputs")?,
            outputs: types("outputs")?,
        }))
    }

    pub fn canonical(&self) -> String {
        let params: Vec<String> = self.inputs.iter().map(AbiType::canonical).collect();
        format!("{}({})", self.name, params.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.canonical().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::ArgumentCount {
                function: self.name.clone(),
                expected: self.inputs.len(),
                got: args.len(),
            });
        }
        let mut data = Vec::with_capacity(4 + 32 * args.len());
        data.extend_from_slice(&self.selector());
        for (index, (arg, ty)) in args.iter().zip(&self.inputs).enumerate() {
            if !arg.matches(*ty) {
                return Err(AbiError::ArgumentType {
                    function: self.name.clone(),
                    index,
                    expected: ty.canonical(),
                });
            }
            data.extend_from_slice(&arg.to_word());
        }
        Ok(data)
    }

    /// Decode the arguments of calldata whose selector matches this function.
    pub fn decode_inputs(&self, calldata: &[u8]) -> Result<Vec<Token>, AbiError> {
        let needed = 4 + 32 * self.inputs.len();
        if calldata.len() < needed {
            return Err(AbiError::Truncated {
                needed,
                got: calldata.len(),
            });
        }
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let word = &calldata[4 + 32 * i..4 + 32 * (i + 1)];
                match ty {
                    AbiType::Address => {
                        let mut raw = [0u8; 20];
                        raw.copy_from_slice(&word[12..]);
                        Ok(Token::Address(Address(raw)))
                    }
                    AbiType::Uint(_) => decode_uint_word(word).map(Token::Uint),
                    AbiType::Bool => Ok(Token::Bool(word[31] != 0)),
                }
            })
            .collect()
    }
}

/// Decode the first 32-byte word of return data as an unsigned integer.
pub fn decode_uint_word(data: &[u8]) -> Result<u64, AbiError> {
    if data.len() < 32 {
        return Err(AbiError::Truncated {
            needed: 32,
            got: data.len(),
        });
    }
    if data[..24].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&data[24..32]);
    Ok(u64::from_be_bytes(tail))
}

/// Like [`decode_uint_word`], but values past `u64::MAX` saturate. Ledger
/// reads are clamped afterwards, so only the magnitude matters.
pub fn saturating_uint_word(data: &[u8]) -> Result<u64, AbiError> {
    match decode_uint_word(data) {
        Err(AbiError::Overflow) => Ok(u64::MAX),
        other => other,
    }
}

/// Read candidates the prober knows about, in priority order per operation.
pub const POSITION_CANDIDATES: [&str; 2] = ["getCurrentStep", "currentStep"];
pub const COMPLETED_CANDIDATES: [&str; 2] = ["getCompletedSteps", "completedSteps"];
pub const PER_STEP_CANDIDATES: [&str; 1] = ["getStepStatus"];

/// Per-step mutating operation name for a 1-based step.
pub fn submit_method_name(step: usize) -> String {
    format!("submitStep{}", step)
}

const APPROVE_PREFIX: &str = "approveStep";

/// Per-step approval operation name for a 1-based step.
pub fn approve_method_name(step: usize) -> String {
    format!("{}{}", APPROVE_PREFIX, step)
}

/// Recover the step number from an `approveStep{N}` function name.
pub fn approve_step_number(name: &str) -> Option<usize> {
    name.strip_prefix(APPROVE_PREFIX)?.parse().ok()
}

/// Interface description for one ledger deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerAbi {
    functions: Vec<FunctionSignature>,
}

impl LedgerAbi {
    /// Build from human-readable fragments; unparseable fragments are skipped.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut abi = Self::default();
        for fragment in fragments {
            match FunctionSignature::parse(fragment.as_ref()) {
                Ok(function) => abi.push(function),
                Err(e) => tracing::debug!("Skipping ABI fragment: {}", e),
            }
        }
        abi
    }

    /// Build from a JSON ABI array (objects and/or human-readable strings).
    pub fn from_json(value: &Value) -> Result<Self, AbiError> {
        let entries = value
            .as_array()
            .ok_or_else(|| AbiError::InvalidSignature("ABI must be a JSON array".to_string()))?;
        let mut abi = Self::default();
        for entry in entries {
            match FunctionSignature::from_json_entry(entry) {
                Ok(Some(function)) => abi.push(function),
                Ok(None) => {}
                Err(e) => tracing::debug!("Skipping ABI entry: {}", e),
            }
        }
        Ok(abi)
    }

    /// Interface used when no ABI file is configured.
    pub fn builtin(total_steps: usize) -> Self {
        let mut fragments = vec![
            "function getCurrentStep(address wallet) view returns (uint8)".to_string(),
            "function currentStep(address wallet) view returns (uint8)".to_string(),
            "function getCompletedSteps(address wallet) view returns (uint8)".to_string(),
            "function completedSteps(address wallet) view returns (uint8)".to_string(),
            "function getStepStatus(address wallet, uint8 step) view returns (uint8)".to_string(),
        ];
        for step in 1..=total_steps {
            fragments.push(format!("function {}()", submit_method_name(step)));
            fragments.push(format!("function {}(address wallet)", approve_method_name(step)));
        }
        Self::from_fragments(fragments)
    }

    fn push(&mut self, function: FunctionSignature) {
        if self.function(&function.name).is_none() {
            self.functions.push(function);
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn by_selector(&self, selector: &[u8]) -> Option<&FunctionSignature> {
        if selector.len() < 4 {
            return None;
        }
        self.functions
            .iter()
            .find(|f| f.selector() == selector[..4])
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
