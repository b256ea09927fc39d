//! Keyed metric signatures.

use crate::core::{Metric, MetricValue, PromLightError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks HMAC-SHA256 signatures over metrics.
///
/// A signer without a key is inert: signing leaves `hash` untouched and every
/// metric verifies.
#[derive(Clone, Default)]
pub struct Signer {
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Signer {
    /// Create a signer. `None` and the empty string both disable signing.
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(|k| k.as_bytes().to_vec()),
        }
    }

    /// Returns true if a key is configured
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    fn mac(&self, key: &[u8], metric: &Metric) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| PromLightError::crypto(format!("invalid signing key: {}", e)))?;
        mac.update(canonical(metric)?.as_bytes());
        Ok(mac)
    }

    /// Fill in the metric's hash.
    pub fn sign(&self, metric: &mut Metric) -> Result<()> {
        let Some(key) = self.key.as_deref() else {
            return Ok(());
        };
        let digest = self.mac(key, metric)?.finalize().into_bytes();
        metric.hash = Some(hex::encode(digest));
        Ok(())
    }

    /// Sign every metric of a batch.
    pub fn sign_batch(&self, metrics: &mut [Metric]) -> Result<()> {
        metrics.iter_mut().try_for_each(|metric| self.sign(metric))
    }

    /// Check the metric's hash against its content.
    pub fn verify(&self, metric: &Metric) -> Result<()> {
        let Some(key) = self.key.as_deref() else {
            return Ok(());
        };

        let invalid = || PromLightError::InvalidSignature(metric.id.clone());
        let expected = metric
            .hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(invalid)?;
        let expected = hex::decode(expected).map_err(|_| invalid())?;

        self.mac(key, metric)?
            .verify_slice(&expected)
            .map_err(|_| invalid())
    }

    /// Check every metric, failing on the first bad one.
    pub fn verify_batch(&self, metrics: &[Metric]) -> Result<()> {
        metrics.iter().try_for_each(|metric| self.verify(metric))
    }

    #[cfg(test)]
    fn digest_hex(&self, metric: &Metric) -> Option<String> {
        let mut copy = metric.clone();
        self.sign(&mut copy).ok()?;
        copy.hash
    }
}

fn canonical(metric: &Metric) -> Result<String> {
    Ok(match metric.payload()? {
        MetricValue::Gauge(value) => format!("{}:gauge:{:.6}", metric.id, value),
        MetricValue::Counter(delta) => format!("{}:counter:{}", metric.id, delta),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MetricKind;

    fn signer() -> Signer {
        Signer::new(Some("secret"))
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = signer();
        let mut gauge = Metric::gauge("Alloc", 123.5);
        let mut counter = Metric::counter("PollCount", 5);
        signer.sign(&mut gauge).unwrap();
        signer.sign(&mut counter).unwrap();

        assert_eq!(gauge.hash.as_ref().map(String::len), Some(64));
        assert!(signer.verify(&gauge).is_ok());
        assert!(signer.verify(&counter).is_ok());
    }

    #[test]
    fn test_tampered_fields_are_detected() {
        let signer = signer();
        let mut metric = Metric::gauge("Alloc", 1.0);
        signer.sign(&mut metric).unwrap();

        let mut renamed = metric.clone();
        renamed.id = "Other".to_string();
        assert!(matches!(signer.verify(&renamed), Err(PromLightError::InvalidSignature(_))));

        let mut changed = metric.clone();
        changed.value = Some(2.0);
        assert!(signer.verify(&changed).is_err());

        let mut rekinded = metric.clone();
        rekinded.kind = MetricKind::Counter;
        rekinded.delta = Some(1);
        assert!(signer.verify(&rekinded).is_err());

        let mut rehashed = metric;
        rehashed.hash = Some("00".repeat(32));
        assert!(signer.verify(&rehashed).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let mut metric = Metric::counter("PollCount", 1);
        signer().sign(&mut metric).unwrap();
        assert!(Signer::new(Some("other")).verify(&metric).is_err());
    }

    #[test]
    fn test_missing_or_garbage_hash_rejected() {
        let signer = signer();
        assert!(signer.verify(&Metric::gauge("Alloc", 1.0)).is_err());

        let mut metric = Metric::gauge("Alloc", 1.0);
        metric.hash = Some("not-hex".to_string());
        assert!(signer.verify(&metric).is_err());
    }

    #[test]
    fn test_disabled_signer_is_noop() {
        let signer = Signer::new(None);
        let mut metric = Metric::gauge("Alloc", 1.0);
        signer.sign(&mut metric).unwrap();
        assert!(metric.hash.is_none());

        metric.hash = Some("anything".to_string());
        assert!(signer.verify(&metric).is_ok());
        assert!(!Signer::new(Some("")).is_enabled());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let signer = signer();
        let mut batch = vec![Metric::gauge("Alloc", 1.0), Metric::counter("PollCount", 2)];
        signer.sign_batch(&mut batch).unwrap();
        assert!(signer.verify_batch(&batch).is_ok());

        batch[1].delta = Some(3);
        assert!(signer.verify_batch(&batch).is_err());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let signer = signer();
        let metric = Metric::gauge("Alloc", 0.1);
        assert_eq!(signer.digest_hex(&metric), signer.digest_hex(&metric));
    }

    #[test]
    fn test_payloadless_metric_cannot_be_signed() {
        let mut metric = Metric::gauge("Alloc", 1.0);
        metric.value = None;
        assert!(matches!(signer().sign(&mut metric), Err(PromLightError::InvalidValue(_))));
    }
}
