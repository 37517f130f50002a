//! Calldata filter for the watched contract methods.
//!
//! Purpose:
//!     Turn human-readable method signatures into 4-byte selectors once, then
//!     decide per pending transaction whether it calls one of them.
//!
//! Notes:
//!     - Parameter names and `function` prefixes are stripped before hashing:
//!       `function devMint(uint256 quantity)` → `devMint(uint256)`.
//!       Tuple members lose their names too; unbalanced parentheses are an
//!       error.
//!     - Only static-ABI shapes are accepted: after the selector the payload
//!       must be whole 32-byte words.

use alloy::primitives::{keccak256, Address, U256};
use anyhow::{bail, Result};
use std::collections::HashMap;
use tracing::trace;

pub type Selector = [u8; 4];

#[derive(Debug, Clone)]
pub struct WatchFilter {
    pub contract_address: Address,
    selectors: HashMap<Selector, String>,
}

impl WatchFilter {
    pub fn new<S: AsRef<str>>(contract_address: Address, signatures: &[S]) -> Result<Self> {
        let mut selectors = HashMap::new();
        for raw in signatures {
            let canonical = canonical_signature(raw.as_ref())?;
            selectors.insert(selector_of(&canonical), canonical);
        }
        Ok(Self {
            contract_address,
            selectors,
        })
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.selectors.values().map(String::as_str)
    }

    /// Signature of the watched method `input` calls, if any.
    pub fn match_input(&self, input: &[u8]) -> Option<&str> {
        if input.len() < 4 {
            return None;
        }
        let selector: Selector = input[..4].try_into().ok()?;
        let Some(signature) = self.selectors.get(&selector) else {
            trace!(
                "Unwatched selector: 0x{:02x}{:02x}{:02x}{:02x}",
                selector[0],
                selector[1],
                selector[2],
                selector[3]
            );
            return None;
        };
        if (input.len() - 4) % 32 != 0 {
            trace!("{}: payload of {} bytes is not word aligned", signature, input.len() - 4);
            return None;
        }
        Some(signature.as_str())
    }

    /// Full check: destination must be the watched contract.
    pub fn match_call(&self, to: Option<Address>, input: &[u8]) -> Option<&str> {
        if to != Some(self.contract_address) {
            return None;
        }
        self.match_input(input)
    }
}

/// `function foo(uint256 a, address b)` → `foo(uint256,address)`.
pub fn canonical_signature(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("function ").unwrap_or(raw).trim();
    let Some(open) = raw.find('(') else {
        bail!("method signature without parameter list: {}", raw);
    };
    let Some(close) = raw.rfind(')') else {
        bail!("unterminated parameter list: {}", raw);
    };
    if close < open {
        bail!("malformed method signature: {}", raw);
    }
    let name = raw[..open].trim();
    if name.is_empty() {
        bail!("method signature without name: {}", raw);
    }

    Ok(format!("{}({})", name, canonical_params(&raw[open + 1..close])?))
}

fn canonical_params(list: &str) -> Result<String> {
    let mut params = Vec::new();
    for param in split_top_level(list) {
        if !param.is_empty() {
            params.push(canonical_param(param)?);
        }
    }
    Ok(params.join(","))
}

/// One parameter without its name. Tuples recurse:
/// `(uint256 a, address b)[] t` → `(uint256,address)[]`.
fn canonical_param(param: &str) -> Result<String> {
    let param = param.trim();
    let Some(inner) = param.strip_prefix('(') else {
        let ty = param.split_whitespace().next().unwrap_or("");
        if ty.contains(['(', ')']) {
            bail!("unbalanced parentheses in parameter: {}", param);
        }
        return Ok(ty.to_string());
    };

    let mut depth = 1usize;
    let mut close = None;
    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        bail!("unbalanced parentheses in parameter: {}", param);
    };
    let rest = &inner[close + 1..];
    let suffix = rest.split(char::is_whitespace).next().unwrap_or("");
    if suffix.contains(['(', ')']) {
        bail!("unbalanced parentheses in parameter: {}", param);
    }
    Ok(format!("({}){}", canonical_params(&inner[..close])?, suffix))
}

/// Split on commas that are not nested inside tuple parentheses.
fn split_top_level(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(params[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(params[start..].trim());
    parts
}

pub fn selector_of(canonical: &str) -> Selector {
    let hash = keccak256(canonical.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Static-ABI call: selector followed by 32-byte big-endian words.
pub fn encode_call(selector: Selector, args: &[U256]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector);
    for arg in args {
        data.extend_from_slice(&arg.to_be_bytes::<32>());
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const CONTRACT: Address = address!("c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0");

    #[test]
    fn test_canonical_signature_strips_names() {
        assert_eq!(canonical_signature("devMint(uint256 quantity)").unwrap(), "devMint(uint256)");
        assert_eq!(
            canonical_signature("function transfer(address to, uint256 amount)").unwrap(),
            "transfer(address,uint256)"
        );
        assert_eq!(canonical_signature("mint()").unwrap(), "mint()");
        assert!(canonical_signature("mint").is_err());
    }

    #[test]
    fn test_known_selectors() {
        // ERC-20 transfer
        assert_eq!(selector_of("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector_of("mint(uint256)"), [0xa0, 0x71, 0x2d, 0x68]);
    }

    #[test]
    fn test_match_requires_word_aligned_payload() {
        let filter = WatchFilter::new(CONTRACT, &["mint(uint256 quantity)"]).unwrap();
        let selector = selector_of("mint(uint256)");

        let good = encode_call(selector, &[U256::from(2)]);
        assert_eq!(filter.match_input(&good), Some("mint(uint256)"));

        let mut ragged = good.clone();
        ragged.push(0);
        assert_eq!(filter.match_input(&ragged), None);

        // selector only, zero words
        assert_eq!(filter.match_input(&selector), Some("mint(uint256)"));
        assert_eq!(filter.match_input(&selector[..3]), None);
    }

    #[test]
    fn test_match_call_checks_destination() {
        let filter = WatchFilter::new(CONTRACT, &["devMint(uint256)", "mint(uint256)"]).unwrap();
        assert_eq!(filter.len(), 2);
        let input = encode_call(selector_of("devMint(uint256)"), &[U256::from(1)]);

        assert_eq!(filter.match_call(Some(CONTRACT), &input), Some("devMint(uint256)"));
        assert_eq!(filter.match_call(Some(Address::ZERO), &input), None);
        assert_eq!(filter.match_call(None, &input), None);
    }

    #[test]
    fn test_unwatched_selector() {
        let filter = WatchFilter::new(CONTRACT, &["mint(uint256)"]).unwrap();
        let input = encode_call(selector_of("transfer(address,uint256)"), &[U256::ZERO, U256::from(5)]);
        assert_eq!(filter.match_input(&input), None);
    }

    #[test]
    fn test_canonical_signature_named_tuples() {
        assert_eq!(
            canonical_signature("f((uint256 a, address b) t)").unwrap(),
            "f((uint256,address))"
        );
        assert_eq!(
            canonical_signature("claim((uint256 id, (address to, uint8 v)[] hops)[] calls, bool ok)").unwrap(),
            "claim((uint256,(address,uint8)[])[],bool)"
        );
        assert_eq!(canonical_signature("g((uint256,address)[2])").unwrap(), "g((uint256,address)[2])");
        assert!(canonical_signature("f((uint256 a, address b t)").is_err());
        assert!(canonical_signature("f(uint256) a)").is_err());
    }
}
