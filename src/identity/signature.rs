//! Client signature rotation

/// Built-in signatures used when the configuration lists none
const BUILTIN_SIGNATURES: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPad; CPU OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
];

/// Device class a signature presents as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePlatform {
    Desktop,
    Mobile,
    Tablet,
}

impl DevicePlatform {
    pub fn classify(signature: &str) -> Self {
        if signature.contains("iPad") || signature.contains("Tablet") {
            Self::Tablet
        } else if signature.contains("Mobile") || signature.contains("iPhone") || signature.contains("Android") {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }
}

/// Round-robin rotation over a list of client signatures with usage counts
#[derive(Debug, Clone)]
pub struct SignatureRotator {
    signatures: Vec<String>,
    usage: Vec<u64>,
    cursor: usize,
}

impl SignatureRotator {
    /// Creates a rotator; an empty list falls back to the built-in signatures
    pub fn new(signatures: Vec<String>) -> Self {
        let signatures: Vec<String> = if signatures.is_empty() {
            BUILTIN_SIGNATURES.iter().map(|s| s.to_string()).collect()
        } else {
            signatures
        };

        Self {
            usage: vec![0; signatures.len()],
            signatures,
            cursor: 0,
        }
    }

    pub fn builtin() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// Next signature in round-robin order
    pub fn next(&mut self) -> String {
        let index = self.cursor % self.signatures.len();
        self.cursor = index + 1;
        self.take(index)
    }

    /// The signature handed out the fewest times (earliest on ties)
    pub fn least_used(&mut self) -> String {
        let index = self
            .usage
            .iter()
            .enumerate()
            .min_by_key(|(_, count)| **count)
            .map(|(index, _)| index)
            .unwrap_or(0);
        self.take(index)
    }

    /// Least used signature of a device class, or the next one if the list has none
    pub fn for_platform(&mut self, platform: DevicePlatform) -> String {
        let index = self
            .signatures
            .iter()
            .enumerate()
            .filter(|(_, signature)| DevicePlatform::classify(signature) == platform)
            .min_by_key(|(index, _)| self.usage[*index])
            .map(|(index, _)| index);

        match index {
            Some(index) => self.take(index),
            None => self.next(),
        }
    }

    fn take(&mut self, index: usize) -> String {
        self.usage[index] += 1;
        self.signatures[index].clone()
    }
}
