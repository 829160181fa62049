//! Audio capability and microphone permission gate.
//!
//! Browsers that gate audio on a user gesture (iOS, Safari) only grant the
//! microphone when the request runs inside the click handler, so the gate is
//! a synchronous check performed before anything is awaited.

use serde::Serialize;

/// Outcome of asking for the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioAccess {
    Granted,
    Denied,
    /// Required audio or WebRTC APIs are missing
    Unsupported(String),
}

/// Synchronous capability and permission check run at call start
pub trait AudioGate: Send {
    fn request_access(&self) -> AudioAccess;
}

/// Gate with a fixed answer
#[derive(Debug, Clone)]
pub struct StaticAudioGate(pub AudioAccess);

impl AudioGate for StaticAudioGate {
    fn request_access(&self) -> AudioAccess {
        self.0.clone()
    }
}

/// Browser family recognised from the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Other,
}

impl BrowserFamily {
    /// Oldest major version with usable WebRTC audio
    pub fn minimum_version(&self) -> Option<u32> {
        match self {
            BrowserFamily::Chrome => Some(90),
            BrowserFamily::Firefox => Some(88),
            BrowserFamily::Safari => Some(14),
            BrowserFamily::Edge => Some(90),
            BrowserFamily::Other => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "Chrome",
            BrowserFamily::Firefox => "Firefox",
            BrowserFamily::Safari => "Safari",
            BrowserFamily::Edge => "Edge",
            BrowserFamily::Other => "Browser",
        }
    }
}

/// What the host platform reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserInfo {
    pub family: BrowserFamily,
    /// Major version, when it could be read from the user agent
    pub version: Option<u32>,
    pub is_ios: bool,
    pub is_android: bool,
    pub supports_webrtc: bool,
    pub supports_audio: bool,
}

impl BrowserInfo {
    /// Classify a user agent string.
    ///
    /// Feature flags default to supported; hosts that can detect the real APIs
    /// should overwrite them.
    pub fn from_user_agent(ua: &str) -> Self {
        let is_ios = ["iPad", "iPhone", "iPod"].iter().any(|d| ua.contains(d));
        let is_android = ua.contains("Android");

        // Order matters: Edge and Chrome both claim "Chrome", every Chromium
        // browser claims "Safari".
        let (family, version) = if ua.contains("Edg/") {
            (BrowserFamily::Edge, major_version_after(ua, "Edg/"))
        } else if ua.contains("Firefox/") {
            (BrowserFamily::Firefox, major_version_after(ua, "Firefox/"))
        } else if ua.contains("Chrome/") {
            (BrowserFamily::Chrome, major_version_after(ua, "Chrome/"))
        } else if ua.contains("Safari") && !is_android {
            (BrowserFamily::Safari, major_version_after(ua, "Version/"))
        } else {
            (BrowserFamily::Other, None)
        };

        Self {
            family,
            version,
            is_ios,
            is_android,
            supports_webrtc: true,
            supports_audio: true,
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.is_ios || self.is_android
    }

    /// Audio must be unlocked from inside a user gesture
    pub fn requires_user_gesture(&self) -> bool {
        self.is_ios || self.family == BrowserFamily::Safari
    }

    /// Check that this platform can hold a voice call
    pub fn check_support(&self) -> Result<(), String> {
        if !self.supports_webrtc {
            return Err("WebRTC is not supported in this browser".to_string());
        }
        if !self.supports_audio {
            return Err("Web Audio API is not supported in this browser".to_string());
        }
        if let (Some(minimum), Some(version)) = (self.family.minimum_version(), self.version) {
            if version < minimum {
                return Err(format!(
                    "{name} {minimum}+ is required (current: {version})",
                    name = self.family.display_name()
                ));
            }
        }
        Ok(())
    }
}

/// Microphone permission as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophonePermission {
    Granted,
    Denied,
}

/// Gate combining the platform capability check with the permission answer
#[derive(Debug, Clone)]
pub struct PlatformAudioGate {
    pub browser: BrowserInfo,
    pub microphone: MicrophonePermission,
}

impl AudioGate for PlatformAudioGate {
    fn request_access(&self) -> AudioAccess {
        if let Err(reason) = self.browser.check_support() {
            return AudioAccess::Unsupported(reason);
        }
        if self.browser.requires_user_gesture() {
            tracing::debug!(
                family = ?self.browser.family,
                mobile = self.browser.is_mobile(),
                "Requesting microphone from within user gesture"
            );
        }
        match self.microphone {
            MicrophonePermission::Granted => AudioAccess::Granted,
            MicrophonePermission::Denied => AudioAccess::Denied,
        }
    }
}

fn major_version_after(ua: &str, marker: &str) -> Option<u32> {
    let start = ua.find(marker)? + marker.len();
    let digits: String = ua[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
