//! Randomized browser environment applied once per launch.

use rand::Rng;
use rand::seq::SliceRandom;

/// Timezones drawn from when launching a browser.
pub const TIMEZONES: &[&str] = &["Asia/Shanghai", "Asia/Hong_Kong", "Asia/Singapore"];

/// Accept-Language values drawn from when launching a browser.
pub const LOCALES: &[&str] = &["zh-CN,zh;q=0.9,en;q=0.8", "en-US,en;q=0.9,zh-CN;q=0.8"];

/// Reported `navigator.deviceMemory` values, in GB.
pub const DEVICE_MEMORY_GB: &[u8] = &[2, 4, 8, 16];

/// Window size, locale and hardware fields reported by one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Window width in pixels (1024..=1920).
    pub width: u32,
    /// Window height in pixels (768..=1080).
    pub height: u32,
    /// IANA timezone id.
    pub timezone: &'static str,
    /// Accept-Language list.
    pub locale: &'static str,
    /// `navigator.hardwareConcurrency` (4..=11).
    pub hardware_concurrency: u8,
    /// `navigator.deviceMemory`.
    pub device_memory_gb: u8,
}

impl Fingerprint {
    /// Draws a fingerprint from the thread-local RNG.
    #[must_use]
    pub fn random() -> Self {
        Self::from_rng(&mut rand::thread_rng())
    }

    /// Draws a fingerprint from `rng`.
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            width: rng.gen_range(1024..=1920),
            height: rng.gen_range(768..=1080),
            timezone: TIMEZONES.choose(rng).copied().unwrap_or("Asia/Shanghai"),
            locale: LOCALES.choose(rng).copied().unwrap_or("en-US,en;q=0.9"),
            hardware_concurrency: rng.gen_range(4..12),
            device_memory_gb: DEVICE_MEMORY_GB.choose(rng).copied().unwrap_or(8),
        }
    }

    /// Returns the locale's language tags without quality values.
    #[must_use]
    pub fn languages(&self) -> Vec<&'static str> {
        let locale: &'static str = self.locale;
        locale
            .split(',')
            .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// Returns the primary language tag, e.g. `zh-CN`.
    #[must_use]
    pub fn primary_language(&self) -> &'static str {
        self.languages().first().copied().unwrap_or("en-US")
    }

    /// Returns the script injected before any page script runs.
    #[must_use]
    pub fn stealth_script(&self) -> String {
        let languages =
            serde_json::to_string(&self.languages()).unwrap_or_else(|_| "[]".to_string());
        format!(
            r"Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {hardware} }});
Object.defineProperty(navigator, 'deviceMemory', {{ get: () => {memory} }});
Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
window.chrome = window.chrome || {{ runtime: {{}} }};
const toDataURL = HTMLCanvasElement.prototype.toDataURL;
HTMLCanvasElement.prototype.toDataURL = function (...args) {{
  const context = this.getContext('2d');
  if (context) {{
    context.fillStyle = 'rgba(0, 0, 0, 0.01)';
    context.fillRect(0, 0, 1, 1);
  }}
  return toDataURL.apply(this, args);
}};",
            hardware = self.hardware_concurrency,
            memory = self.device_memory_gb,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_fingerprint_fields_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let fp = Fingerprint::from_rng(&mut rng);
            assert!((1024..=1920).contains(&fp.width));
            assert!((768..=1080).contains(&fp.height));
            assert!((4..12).contains(&fp.hardware_concurrency));
            assert!(DEVICE_MEMORY_GB.contains(&fp.device_memory_gb));
            assert!(TIMEZONES.contains(&fp.timezone));
            assert!(LOCALES.contains(&fp.locale));
        }
    }

    #[test]
    fn test_languages_strip_quality_values() {
        let fp = Fingerprint {
            width: 1280,
            height: 800,
            timezone: "Asia/Shanghai",
            locale: "zh-CN,zh;q=0.9,en;q=0.8",
            hardware_concurrency: 8,
            device_memory_gb: 8,
        };
        assert_eq!(fp.languages(), vec!["zh-CN", "zh", "en"]);
        assert_eq!(fp.primary_language(), "zh-CN");
    }

    #[test]
    fn test_stealth_script_embeds_hardware_fields() {
        let fp = Fingerprint {
            width: 1280,
            height: 800,
            timezone: "Asia/Singapore",
            locale: "en-US,en;q=0.9,zh-CN;q=0.8",
            hardware_concurrency: 6,
            device_memory_gb: 16,
        };
        let script = fp.stealth_script();
        assert!(script.contains("get: () => 6 "));
        assert!(script.contains("get: () => 16 "));
        assert!(script.contains(r#"["en-US","en","zh-CN"]"#));
        assert!(script.contains("'webdriver'"));
    }
}
