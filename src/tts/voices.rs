//! The fixed voice catalog.
//!
//! A selection is an opaque id chosen by the user; each entry carries the
//! per-provider mapping used when building requests. Selections are never
//! validated against provider-side voice lists — an id unknown to the
//! catalog is passed through unchanged and a tier may silently ignore it.

pub struct VoiceProfile {
    pub id: &'static str,
    pub label: &'static str,
    pub elevenlabs_id: &'static str,
    pub playht_voice: &'static str,
    pub espeak_voice: &'static str,
}

pub const CATALOG: &[VoiceProfile] = &[
    VoiceProfile {
        id: "rachel",
        label: "Rachel (calm, American)",
        elevenlabs_id: "21m00Tcm4TlvDq8ikWAM",
        playht_voice: "s3://voice-cloning-zero-shot/d9ff78ba-d016-47f6-b0ef-dd630f59414e/female-cs/manifest.json",
        espeak_voice: "en-us+f3",
    },
    VoiceProfile {
        id: "drew",
        label: "Drew (well-rounded, American)",
        elevenlabs_id: "29vD33N1CtxCmqQRPOHJ",
        playht_voice: "s3://voice-cloning-zero-shot/820da3d2-3a3b-42e7-844d-e68db835a206/sarah/manifest.json",
        espeak_voice: "en-us+m3",
    },
    VoiceProfile {
        id: "clyde",
        label: "Clyde (war veteran, American)",
        elevenlabs_id: "2EiwWnXFnvU5JabPnv8n",
        playht_voice: "s3://voice-cloning-zero-shot/7c38b588-14e8-42b9-bacd-e03d1d673c3c/nicole/manifest.json",
        espeak_voice: "en-us+m5",
    },
    VoiceProfile {
        id: "grace",
        label: "Grace (gentle, Southern American)",
        elevenlabs_id: "oWAxZDx7w5VEj9dCyTzz",
        playht_voice: "s3://voice-cloning-zero-shot/f6c4ed76-1b55-4cd9-8896-31f7535f6cdb/male-cs/manifest.json",
        espeak_voice: "en-us+f4",
    },
    VoiceProfile {
        id: "daniel",
        label: "Daniel (deep, British)",
        elevenlabs_id: "onwK4e9ZLuTAKqWW03F9",
        playht_voice: "s3://voice-cloning-zero-shot/36e9c53d-ca4e-4815-b5ed-9732be3839b4/samuel/manifest.json",
        espeak_voice: "en-gb+m2",
    },
];

pub fn profile(id: &str) -> Option<&'static VoiceProfile> {
    CATALOG.iter().find(|p| p.id == id)
}

/// ElevenLabs voice id for a selection, or the selection itself when it is
/// not in the catalog.
pub fn elevenlabs_voice(selection: &str) -> &str {
    profile(selection)
        .map(|p| p.elevenlabs_id)
        .unwrap_or(selection)
}

pub fn playht_voice(selection: &str) -> &str {
    profile(selection).map(|p| p.playht_voice).unwrap_or(selection)
}

pub fn espeak_voice(selection: &str) -> &str {
    profile(selection).map(|p| p.espeak_voice).unwrap_or(selection)
}
