//! FFmpeg media backend with hardware acceleration support
//!
//! `FfmpegSource` demuxes a local file one access unit at a time.
//! `FfmpegDecoder` drives FFmpeg's send/receive API behind the queue model of
//! `HardwareDecoder`: a single input slot, a single output buffer, and
//! end-of-stream reported as an empty buffer carrying the EOS flag.
//! Hardware surfaces (VideoToolbox, D3D11VA, NVDEC, VAAPI) are transferred to
//! system memory before their planes are exposed.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::{Rational, Rescale};

use super::image::{CropRect, DecodedImage, ImageFormat, PlaneView};
use super::source::{
    BufferFlags, DecoderError, EncodedUnit, HardwareDecoder, InputSlot, MediaBackend, MediaSource,
    OutputBuffer, OutputEvent, OutputFormat, SeekMode, SourceError, TrackFormat,
};

/// Microsecond time base used for every timestamp leaving the backend
const MICROSECONDS: Rational = Rational(1, 1_000_000);

/// Hardware acceleration method in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwAccelMethod {
    /// No hardware acceleration (software decode)
    None,
    /// macOS VideoToolbox
    VideoToolbox,
    /// Windows D3D11VA
    D3d11va,
    /// NVIDIA NVDEC
    Nvdec,
    /// Linux VA-API
    Vaapi,
}

impl HwAccelMethod {
    /// Methods worth trying on this platform, in order of preference
    pub fn platform_candidates() -> &'static [HwAccelMethod] {
        #[cfg(target_os = "macos")]
        {
            &[HwAccelMethod::VideoToolbox]
        }
        #[cfg(target_os = "windows")]
        {
            &[HwAccelMethod::D3d11va, HwAccelMethod::Nvdec]
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            &[HwAccelMethod::Vaapi, HwAccelMethod::Nvdec]
        }
    }

    fn device_type(self) -> Option<ffmpeg_next::ffi::AVHWDeviceType> {
        use ffmpeg_next::ffi::AVHWDeviceType;
        match self {
            HwAccelMethod::None => None,
            HwAccelMethod::VideoToolbox => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX),
            HwAccelMethod::D3d11va => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA),
            HwAccelMethod::Nvdec => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA),
            HwAccelMethod::Vaapi => Some(AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI),
        }
    }
}

impl std::fmt::Display for HwAccelMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HwAccelMethod::None => write!(f, "software"),
            HwAccelMethod::VideoToolbox => write!(f, "videotoolbox"),
            HwAccelMethod::D3d11va => write!(f, "d3d11va"),
            HwAccelMethod::Nvdec => write!(f, "nvdec"),
            HwAccelMethod::Vaapi => write!(f, "vaapi"),
        }
    }
}

/// MIME type for a codec, following the names hardware codec APIs use
pub fn codec_mime(medium: ffmpeg_next::media::Type, codec: ffmpeg_next::codec::Id) -> String {
    use ffmpeg_next::codec::Id;
    use ffmpeg_next::media::Type;

    let known = match codec {
        Id::H264 => Some("video/avc"),
        Id::HEVC => Some("video/hevc"),
        Id::VP8 => Some("video/x-vnd.on2.vp8"),
        Id::VP9 => Some("video/x-vnd.on2.vp9"),
        Id::AV1 => Some("video/av01"),
        Id::MPEG4 => Some("video/mp4v-es"),
        Id::H263 => Some("video/3gpp"),
        Id::MPEG2VIDEO => Some("video/mpeg2"),
        Id::AAC => Some("audio/mp4a-latm"),
        Id::MP3 => Some("audio/mpeg"),
        Id::OPUS => Some("audio/opus"),
        Id::VORBIS => Some("audio/vorbis"),
        Id::FLAC => Some("audio/flac"),
        _ => None,
    };
    if let Some(mime) = known {
        return mime.to_string();
    }

    let family = match medium {
        Type::Video => "video",
        Type::Audio => "audio",
        Type::Subtitle => "text",
        _ => "application",
    };
    format!("{}/{}", family, codec.name())
}

/// Per-track information captured when the container is opened
#[derive(Debug, Clone)]
struct TrackInfo {
    format: TrackFormat,
    time_base: Rational,
}

/// Demuxer over a local media file
pub struct FfmpegSource {
    input: ffmpeg_next::format::context::Input,
    tracks: Vec<TrackInfo>,
    selected: Option<usize>,
    /// Access unit at the current read position
    current: Option<EncodedUnit>,
    exhausted: bool,
}

impl FfmpegSource {
    /// Open a local file and enumerate its tracks
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let path_str = path.to_string_lossy().to_string();
        ffmpeg_next::init().map_err(|e| SourceError::OpenFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|e| SourceError::OpenFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let tracks = input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let medium = parameters.medium();
                // Dimensions are only exposed through the raw parameters
                let (width, height) = unsafe {
                    let raw = parameters.as_ptr();
                    ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32)
                };
                let is_video = medium == ffmpeg_next::media::Type::Video;
                TrackInfo {
                    format: TrackFormat {
                        mime: codec_mime(medium, parameters.id()),
                        width: if is_video { width } else { 0 },
                        height: if is_video { height } else { 0 },
                    },
                    time_base: stream.time_base(),
                }
            })
            .collect::<Vec<_>>();

        tracing::info!("Opened {}: {} track(s)", path_str, tracks.len());

        Ok(Self {
            input,
            tracks,
            selected: None,
            current: None,
            exhausted: false,
        })
    }

    /// Read packets until one belongs to the selected track
    fn fill(&mut self) -> Result<(), SourceError> {
        while self.current.is_none() && !self.exhausted {
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => {
                    self.exhausted = true;
                    break;
                }
                Err(e) => return Err(SourceError::ReadFailed(e.to_string())),
            }

            let track_index = packet.stream();
            if self.selected.is_some_and(|selected| selected != track_index) {
                continue;
            }
            let Some(track) = self.tracks.get(track_index) else {
                continue;
            };

            let pts = packet.pts().or(packet.dts()).unwrap_or(0);
            self.current = Some(EncodedUnit {
                data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                pts_us: pts.rescale(track.time_base, MICROSECONDS),
                track_index,
            });
        }
        Ok(())
    }
}

impl MediaSource for FfmpegSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).map(|track| track.format.clone())
    }

    fn select_track(&mut self, index: usize) -> Result<(), SourceError> {
        if index >= self.tracks.len() {
            return Err(SourceError::InvalidTrack(index));
        }
        self.selected = Some(index);
        self.current = None;
        Ok(())
    }

    fn read_sample(&mut self) -> Result<Option<EncodedUnit>, SourceError> {
        self.fill()?;
        Ok(self.current.clone())
    }

    fn advance(&mut self) -> bool {
        self.current = None;
        if let Err(e) = self.fill() {
            tracing::warn!("Failed to read next sample: {}", e);
            self.exhausted = true;
        }
        self.current.is_some()
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<(), SourceError> {
        // FFmpeg's input.seek() uses AV_TIME_BASE (microseconds)
        let result = match mode {
            SeekMode::PreviousSync => self.input.seek(time_us, ..time_us),
            SeekMode::NextSync => self.input.seek(time_us, time_us..),
            SeekMode::ClosestSync => self.input.seek(time_us, ..),
        };
        result.map_err(|e| SourceError::SeekFailed(e.to_string()))?;
        self.current = None;
        self.exhausted = false;
        Ok(())
    }
}

/// Which frame holds the pixels of the current output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameStore {
    Decoded,
    Transferred,
}

/// Decoder emulating an input/output buffer queue over FFmpeg
pub struct FfmpegDecoder {
    decoder: ffmpeg_next::decoder::Video,
    hwaccel: HwAccelMethod,
    /// Packet refused by a full decoder, resent before accepting more input
    pending: Option<ffmpeg_next::Packet>,
    /// End of stream was queued by the caller
    eos_queued: bool,
    /// End of stream was passed on to FFmpeg
    eof_sent: bool,
    /// The EOS output buffer was handed out
    eos_reported: bool,
    frame: ffmpeg_next::frame::Video,
    sw_frame: ffmpeg_next::frame::Video,
    store: FrameStore,
    /// A received frame waiting to be dequeued (held back by a format change)
    staged: bool,
    /// The single output buffer is dequeued and not yet released
    held: bool,
    format: Option<OutputFormat>,
}

impl FfmpegDecoder {
    /// Create a decoder for one stream, trying hardware acceleration first
    pub fn create(
        stream: &ffmpeg_next::format::stream::Stream,
        mime: &str,
        try_hwaccel: bool,
    ) -> Result<Self, SourceError> {
        let creation_failed = |reason: String| SourceError::DecoderCreationFailed {
            mime: mime.to_string(),
            reason,
        };

        let (decoder, hwaccel) = if try_hwaccel {
            match Self::try_create_hwaccel_decoder(stream) {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!("Hardware acceleration failed: {}. Falling back to software decode.", e);
                    (Self::create_software_decoder(stream).map_err(creation_failed)?, HwAccelMethod::None)
                }
            }
        } else {
            (Self::create_software_decoder(stream).map_err(creation_failed)?, HwAccelMethod::None)
        };

        tracing::info!(
            "Decoder for {}: {}x{}, hwaccel: {}",
            mime,
            decoder.width(),
            decoder.height(),
            hwaccel
        );

        Ok(Self {
            decoder,
            hwaccel,
            pending: None,
            eos_queued: false,
            eof_sent: false,
            eos_reported: false,
            frame: ffmpeg_next::frame::Video::empty(),
            sw_frame: ffmpeg_next::frame::Video::empty(),
            store: FrameStore::Decoded,
            staged: false,
            held: false,
            format: None,
        })
    }

    fn create_software_decoder(
        stream: &ffmpeg_next::format::stream::Stream,
    ) -> Result<ffmpeg_next::decoder::Video, String> {
        let context = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| format!("Failed to create context: {}", e))?;
        context
            .decoder()
            .video()
            .map_err(|e| format!("Failed to create video decoder: {}", e))
    }

    /// Try each platform hardware device in turn
    fn try_create_hwaccel_decoder(
        stream: &ffmpeg_next::format::stream::Stream,
    ) -> Result<(ffmpeg_next::decoder::Video, HwAccelMethod), String> {
        for &method in HwAccelMethod::platform_candidates() {
            match Self::create_hwaccel_decoder_with_method(stream, method) {
                Ok(decoder) => {
                    tracing::info!("Hardware acceleration enabled: {}", method);
                    return Ok((decoder, method));
                }
                Err(e) => {
                    tracing::debug!("Hardware acceleration {} not available: {}", method, e);
                }
            }
        }

        Err("No hardware acceleration available".to_string())
    }

    /// Attach a hardware device context before opening the codec
    ///
    /// With a device attached, FFmpeg's default format negotiation picks the
    /// hardware surface format whenever the codec supports it.
    fn create_hwaccel_decoder_with_method(
        stream: &ffmpeg_next::format::stream::Stream,
        method: HwAccelMethod,
    ) -> Result<ffmpeg_next::decoder::Video, String> {
        let device_type = method
            .device_type()
            .ok_or_else(|| "No hwaccel requested".to_string())?;

        let mut context = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| format!("Failed to create context: {}", e))?;

        unsafe {
            let mut device: *mut ffmpeg_next::ffi::AVBufferRef = std::ptr::null_mut();
            let ret = ffmpeg_next::ffi::av_hwdevice_ctx_create(
                &mut device,
                device_type,
                std::ptr::null(),
                std::ptr::null_mut(),
                0,
            );
            if ret < 0 {
                return Err(format!(
                    "Failed to create {} device: {}",
                    method,
                    ffmpeg_next::Error::from(ret)
                ));
            }
            // The codec context takes ownership of the device reference
            (*context.as_mut_ptr()).hw_device_ctx = device;
        }

        context
            .decoder()
            .video()
            .map_err(|e| format!("Failed to open decoder: {}", e))
    }

    /// Check if a pixel format is a hardware format
    fn is_hardware_format(format: Pixel) -> bool {
        matches!(
            format,
            Pixel::VIDEOTOOLBOX
                | Pixel::D3D11
                | Pixel::CUDA
                | Pixel::QSV
                | Pixel::VAAPI
                | Pixel::VDPAU
                | Pixel::DXVA2_VLD
        )
    }

    pub fn hwaccel_method(&self) -> HwAccelMethod {
        self.hwaccel
    }

    fn is_eagain(error: &ffmpeg_next::Error) -> bool {
        matches!(
            error,
            ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN
            }
        )
    }

    /// Push a refused packet and a queued end of stream into FFmpeg
    ///
    /// Returns false while the decoder still refuses input.
    fn push_pending(&mut self) -> Result<bool, DecoderError> {
        if let Some(packet) = self.pending.take() {
            match self.decoder.send_packet(&packet) {
                Ok(()) => {}
                Err(e) if Self::is_eagain(&e) => {
                    self.pending = Some(packet);
                    return Ok(false);
                }
                Err(e) => return Err(DecoderError::DecodeFailed(e.to_string())),
            }
        }

        if self.eos_queued && !self.eof_sent {
            match self.decoder.send_eof() {
                Ok(()) | Err(ffmpeg_next::Error::Eof) => self.eof_sent = true,
                Err(e) if Self::is_eagain(&e) => return Ok(false),
                Err(e) => return Err(DecoderError::DecodeFailed(e.to_string())),
            }
        }
        Ok(true)
    }

    fn image_frame(&self) -> &ffmpeg_next::frame::Video {
        match self.store {
            FrameStore::Decoded => &self.frame,
            FrameStore::Transferred => &self.sw_frame,
        }
    }

    /// Receive one frame into `self.frame`, transferring hardware surfaces
    fn receive(&mut self) -> Result<bool, DecoderError> {
        match self.decoder.receive_frame(&mut self.frame) {
            Ok(()) => {}
            Err(e) if Self::is_eagain(&e) => return Ok(false),
            Err(ffmpeg_next::Error::Eof) => return Ok(false),
            Err(e) => return Err(DecoderError::DecodeFailed(e.to_string())),
        }

        self.store = FrameStore::Decoded;
        if Self::is_hardware_format(self.frame.format()) {
            self.sw_frame = Self::transfer_hw_frame(&self.frame)?;
            self.store = FrameStore::Transferred;
        }
        Ok(true)
    }

    /// Download a hardware surface into a new system-memory frame
    ///
    /// The destination is allocated per call so its size and pixel format
    /// always follow the surface, including after a mid-stream resolution
    /// change.
    fn transfer_hw_frame(
        hw_frame: &ffmpeg_next::frame::Video,
    ) -> Result<ffmpeg_next::frame::Video, DecoderError> {
        let mut sw_frame = ffmpeg_next::frame::Video::empty();
        let ret = unsafe {
            if (*hw_frame.as_ptr()).hw_frames_ctx.is_null() {
                return Err(DecoderError::DecodeFailed(
                    "Frame has no hardware frames context".to_string(),
                ));
            }
            ffmpeg_next::ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), hw_frame.as_ptr(), 0)
        };
        if ret < 0 {
            return Err(DecoderError::DecodeFailed(format!(
                "Failed to transfer hwframe to system memory: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        sw_frame.set_pts(hw_frame.timestamp().or(hw_frame.pts()));
        Ok(sw_frame)
    }

    fn describe(frame: &ffmpeg_next::frame::Video) -> OutputFormat {
        OutputFormat {
            pixel_format: format!("{:?}", frame.format()).to_lowercase(),
            width: frame.width(),
            height: frame.height(),
        }
    }

    fn frame_buffer(&self) -> OutputBuffer {
        let frame = self.image_frame();
        let size = (0..frame.planes()).map(|plane| frame.data(plane).len()).sum();
        OutputBuffer {
            index: 0,
            size,
            pts_us: frame.pts().unwrap_or(0),
            flags: BufferFlags::NONE,
        }
    }
}

// FFmpeg decodes synchronously inside send/receive, so there is nothing to
// wait on: both dequeue calls answer immediately and ignore their timeouts.
impl HardwareDecoder for FfmpegDecoder {
    fn dequeue_input(&mut self, _timeout: Duration) -> Option<InputSlot> {
        if self.eos_queued {
            return None;
        }
        match self.push_pending() {
            Ok(true) => Some(InputSlot(0)),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!("Dropping refused packet: {}", e);
                Some(InputSlot(0))
            }
        }
    }

    fn queue_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), DecoderError> {
        if slot.0 != 0 || self.pending.is_some() || self.eos_queued {
            return Err(DecoderError::InvalidInputSlot(slot.0));
        }

        if !data.is_empty() {
            let mut packet = ffmpeg_next::Packet::copy(data);
            // Frames carry packet timestamps through unchanged
            packet.set_pts(Some(pts_us));
            match self.decoder.send_packet(&packet) {
                Ok(()) => {}
                Err(e) if Self::is_eagain(&e) => self.pending = Some(packet),
                Err(e) => return Err(DecoderError::DecodeFailed(e.to_string())),
            }
        }

        if flags.end_of_stream {
            self.eos_queued = true;
            self.push_pending()?;
        }
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputEvent, DecoderError> {
        if self.held {
            return Ok(OutputEvent::TryAgainLater);
        }

        if !self.staged {
            if !self.receive()? {
                // Draining after end of stream
                if self.eof_sent && self.pending.is_none() && !self.eos_reported {
                    self.eos_reported = true;
                    self.held = true;
                    return Ok(OutputEvent::Buffer(OutputBuffer {
                        index: 0,
                        size: 0,
                        pts_us: 0,
                        flags: BufferFlags::END_OF_STREAM,
                    }));
                }
                self.push_pending()?;
                return Ok(OutputEvent::TryAgainLater);
            }
            self.staged = true;

            let format = Self::describe(self.image_frame());
            if self.format.as_ref() != Some(&format) {
                self.format = Some(format.clone());
                return Ok(OutputEvent::FormatChanged(format));
            }
        }

        self.staged = false;
        self.held = true;
        Ok(OutputEvent::Buffer(self.frame_buffer()))
    }

    fn output_image(&mut self, index: usize) -> Option<DecodedImage<'_>> {
        // The EOS buffer carries no image
        if index != 0 || !self.held || self.eos_reported {
            return None;
        }
        let frame = self.image_frame();
        if frame.width() == 0 || frame.height() == 0 {
            return None;
        }

        let crop = CropRect::full(frame.width(), frame.height());
        let pts_us = frame.pts().unwrap_or(0);
        let plane = |i, offset, pixel_stride| plane_view(frame, i, offset, pixel_stride);

        let (format, planes) = match frame.format() {
            Pixel::YUV420P | Pixel::YUVJ420P => (
                ImageFormat::Yuv420Flexible,
                vec![plane(0, 0, 1), plane(1, 0, 1), plane(2, 0, 1)],
            ),
            Pixel::NV12 => (
                ImageFormat::Yuv420Flexible,
                vec![plane(0, 0, 1), plane(1, 0, 2), plane(1, 1, 2)],
            ),
            Pixel::NV21 => (
                ImageFormat::Nv21,
                vec![plane(0, 0, 1), plane(1, 1, 2), plane(1, 0, 2)],
            ),
            other => (
                ImageFormat::Unsupported(format!("{:?}", other).to_lowercase()),
                (0..frame.planes()).map(|i| plane(i, 0, 1)).collect(),
            ),
        };

        Some(DecodedImage {
            format,
            crop,
            planes,
            pts_us,
        })
    }

    fn release_output(&mut self, index: usize, _rendered: bool) {
        if index == 0 {
            self.held = false;
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.pending = None;
        self.eos_queued = false;
        self.eof_sent = false;
        self.eos_reported = false;
        self.staged = false;
        self.held = false;
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format.clone()
    }
}

/// View one frame plane, starting `offset` bytes in
fn plane_view(frame: &ffmpeg_next::frame::Video, index: usize, offset: usize, pixel_stride: usize) -> PlaneView<'_> {
    let data = frame.data(index);
    PlaneView::new(data.get(offset..).unwrap_or(&[]), frame.stride(index), pixel_stride)
}

/// FFmpeg-backed `MediaBackend`
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    /// Try platform hardware decoders before software decode
    pub hardware_acceleration: bool,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            hardware_acceleration: true,
        }
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = FfmpegSource;
    type Decoder = FfmpegDecoder;

    fn open_source(&self, path: &Path) -> Result<FfmpegSource, SourceError> {
        FfmpegSource::open(path)
    }

    fn create_decoder(
        &self,
        source: &FfmpegSource,
        track_index: usize,
        format: &TrackFormat,
    ) -> Result<FfmpegDecoder, SourceError> {
        let stream = source
            .input
            .stream(track_index)
            .ok_or(SourceError::InvalidTrack(track_index))?;
        FfmpegDecoder::create(&stream, &format.mime, self.hardware_acceleration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hwaccel_method_display() {
        assert_eq!(format!("{}", HwAccelMethod::VideoToolbox), "videotoolbox");
        assert_eq!(format!("{}", HwAccelMethod::None), "software");
        assert!(HwAccelMethod::None.device_type().is_none());
    }

    #[test]
    fn test_codec_mime() {
        use ffmpeg_next::codec::Id;
        use ffmpeg_next::media::Type;

        assert_eq!(codec_mime(Type::Video, Id::H264), "video/avc");
        assert_eq!(codec_mime(Type::Video, Id::VP9), "video/x-vnd.on2.vp9");
        assert_eq!(codec_mime(Type::Audio, Id::AAC), "audio/mp4a-latm");
        assert!(codec_mime(Type::Video, Id::PRORES).starts_with("video/"));
        assert!(codec_mime(Type::Data, Id::None).starts_with("application/"));
    }

    #[test]
    fn test_transfer_rejects_software_frame() {
        let frame = ffmpeg_next::frame::Video::new(Pixel::YUV420P, 16, 8);
        assert!(matches!(
            FfmpegDecoder::transfer_hw_frame(&frame),
            Err(DecoderError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_describe_follows_frame_geometry() {
        let large = ffmpeg_next::frame::Video::new(Pixel::NV12, 64, 32);
        let small = ffmpeg_next::frame::Video::new(Pixel::NV12, 32, 16);
        let before = FfmpegDecoder::describe(&large);
        let after = FfmpegDecoder::describe(&small);
        assert_eq!((after.width, after.height), (32, 16));
        assert_eq!(after.pixel_format, "nv12");
        assert_ne!(before, after);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegSource::open(Path::new("/nonexistent/clip.mp4"));
        assert!(matches!(result, Err(SourceError::OpenFailed { .. })));
    }
}
