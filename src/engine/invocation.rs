//! Engine argument construction

use std::ffi::OsString;
use std::path::Path;

use crate::domain::model::{Codec, CompressionConfig, HardwareBackend, VideoFile};
use crate::ports::EngineInvocation;

const AUDIO_CODEC: &str = "aac";
const AUDIO_BITRATE: &str = "128k";
const SOFTWARE_PRESET: &str = "medium";

pub struct InvocationBuilder;

impl InvocationBuilder {
    /// Arguments that compress `file` into `output` with `config`.
    ///
    /// Progress goes to stdout as `-progress` key/value blocks; stderr is left
    /// for diagnostics.
    pub fn build(file: &VideoFile, config: &CompressionConfig, output: &Path) -> EngineInvocation {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into(), "-i".into()];
        args.push(file.source().to_engine_input());

        let backend = config.effective_backend();
        args.push("-c:v".into());
        args.push(config.encoder().into());
        args.extend(Self::quality_args(config, backend));

        if backend.is_none() {
            args.push("-preset".into());
            args.push(SOFTWARE_PRESET.into());
        }
        if config.codec == Codec::Hevc {
            // Apple players refuse hev1-tagged HEVC in MP4
            args.push("-tag:v".into());
            args.push("hvc1".into());
        }

        for arg in [
            "-c:a",
            AUDIO_CODEC,
            "-b:a",
            AUDIO_BITRATE,
            "-movflags",
            "+faststart",
            "-progress",
            "pipe:1",
            "-nostats",
        ] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_os_string());

        EngineInvocation { args }
    }

    /// Rate-control flags for the selected encoder family
    fn quality_args(config: &CompressionConfig, backend: Option<HardwareBackend>) -> Vec<OsString> {
        let quality = config.effective_quality();
        let pair = |flag: &str, value: String| vec![OsString::from(flag), OsString::from(value)];

        match backend {
            None => pair("-crf", quality.to_string()),
            Some(HardwareBackend::Nvenc) => {
                let mut args = pair("-rc", "vbr".to_string());
                args.extend(pair("-cq", quality.to_string()));
                args
            }
            Some(HardwareBackend::Qsv) => pair("-global_quality", quality.to_string()),
            Some(HardwareBackend::Vaapi) => pair("-qp", quality.to_string()),
            Some(HardwareBackend::VideoToolbox) => {
                pair("-q:v", Self::videotoolbox_quality(quality).to_string())
            }
        }
    }

    /// VideoToolbox takes 1..=100 where higher is better; map the CRF scale
    /// onto it so the same knob means roughly the same thing.
    fn videotoolbox_quality(crf: u8) -> u8 {
        let scaled = 100i32 - (i32::from(crf) - 10) * 2;
        scaled.clamp(1, 100) as u8
    }
}
