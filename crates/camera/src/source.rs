use glint_bridge::{CaptureFormat, select_capture_format};
use windows::{
    Foundation::TypedEventHandler,
    Media::Capture::{
        Frames::{
            MediaFrameArrivedEventArgs, MediaFrameFormat, MediaFrameReader,
            MediaFrameReaderStartStatus, MediaFrameSource, MediaFrameSourceGroup,
            MediaFrameSourceInfo, MediaFrameSourceKind,
        },
        MediaCapture, MediaCaptureInitializationSettings, StreamingCaptureMode,
    },
    Win32::{
        Foundation::S_FALSE,
        Graphics::Direct3D11::ID3D11Texture2D,
        System::WinRT::{
            Direct3D11::IDirect3DDxgiInterfaceAccess, RO_INIT_MULTITHREADED, RoInitialize,
        },
    },
    core::Interface,
};

#[derive(Debug, thiserror::Error)]
pub enum OpenCameraError {
    /// No source group exposes a color video stream. Informational rather
    /// than fatal; there simply is no camera to bridge.
    #[error("NoCamera")]
    NoCamera,
    #[error("InitializeWinRT: {0}")]
    InitializeWinRT(windows::core::Error),
    #[error("EnumerateSourceGroups: {0}")]
    EnumerateSourceGroups(windows::core::Error),
    #[error("InitializeCapture: {0}")]
    InitializeCapture(windows::core::Error),
    #[error("LookupFrameSource: {0}")]
    LookupFrameSource(windows::core::Error),
    #[error("SetFormat: {0}")]
    SetFormat(windows::core::Error),
    #[error("CreateFrameReader: {0}")]
    CreateFrameReader(windows::core::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StartCameraError {
    #[error("AlreadyStarted")]
    AlreadyStarted,
    #[error("RegisterFrameArrived: {0}")]
    RegisterFrameArrived(windows::core::Error),
    #[error("StartReader: {0}")]
    StartReader(windows::core::Error),
    #[error("StartRejected/{0:?}")]
    StartRejected(MediaFrameReaderStartStatus),
}

#[derive(Debug, thiserror::Error)]
pub enum StopCameraError {
    #[error("NotStarted")]
    NotStarted,
    #[error("StopReader: {0}")]
    StopReader(windows::core::Error),
}

/// A frame reader over the first color camera the system exposes.
///
/// Frames are delivered on a platform thread via the callback passed to
/// [`CameraSource::start`]; the borrowed texture is only valid for the
/// duration of that call.
pub struct CameraSource {
    capture: MediaCapture,
    reader: MediaFrameReader,
    arrived_token: Option<i64>,
}

impl CameraSource {
    pub fn open() -> Result<Self, OpenCameraError> {
        init_winrt()?;

        let (group, color_info) = find_color_source()?;
        if let Ok(name) = group.DisplayName() {
            tracing::info!("using camera source group \"{name}\"");
        }

        let capture = MediaCapture::new().map_err(OpenCameraError::InitializeCapture)?;
        (|| {
            let settings = MediaCaptureInitializationSettings::new()?;
            settings.SetSourceGroup(&group)?;
            settings.SetStreamingCaptureMode(StreamingCaptureMode::Video)?;
            capture.InitializeWithSettingsAsync(&settings)?.get()
        })()
        .map_err(OpenCameraError::InitializeCapture)?;

        let source = (|| capture.FrameSources()?.Lookup(&color_info.Id()?))()
            .map_err(OpenCameraError::LookupFrameSource)?;

        configure_format(&source).map_err(OpenCameraError::SetFormat)?;

        let reader = (|| capture.CreateFrameReaderAsync(&source)?.get())()
            .map_err(OpenCameraError::CreateFrameReader)?;

        Ok(Self {
            capture,
            reader,
            arrived_token: None,
        })
    }

    /// Registers the arrival callback and starts frame delivery.
    ///
    /// A notification with no acquirable frame is a silent no-op; a frame
    /// without a GPU surface is skipped.
    pub fn start(
        &mut self,
        mut on_frame: impl FnMut(&ID3D11Texture2D) + Send + 'static,
    ) -> Result<(), StartCameraError> {
        if self.arrived_token.is_some() {
            return Err(StartCameraError::AlreadyStarted);
        }

        let handler = TypedEventHandler::<MediaFrameReader, MediaFrameArrivedEventArgs>::new(
            move |reader, _| {
                let Some(reader) = reader.as_ref() else {
                    return Ok(());
                };
                let Ok(frame) = reader.TryAcquireLatestFrame() else {
                    return Ok(());
                };
                let Ok(video_frame) = frame.VideoMediaFrame() else {
                    tracing::debug!("frame carries no video payload");
                    return Ok(());
                };
                let Ok(surface) = video_frame.Direct3DSurface() else {
                    tracing::debug!("frame carries no D3D surface");
                    return Ok(());
                };

                let texture = surface
                    .cast::<IDirect3DDxgiInterfaceAccess>()
                    .and_then(|access| unsafe { access.GetInterface::<ID3D11Texture2D>() });
                match texture {
                    Ok(texture) => on_frame(&texture),
                    Err(e) => tracing::error!("camera surface is not a D3D11 texture: {e}"),
                }
                Ok(())
            },
        );

        let token = self
            .reader
            .FrameArrived(&handler)
            .map_err(StartCameraError::RegisterFrameArrived)?;
        self.arrived_token = Some(token);

        let status = (|| self.reader.StartAsync()?.get())().map_err(StartCameraError::StartReader)?;
        if status != MediaFrameReaderStartStatus::Success {
            return Err(StartCameraError::StartRejected(status));
        }

        tracing::info!("camera frame reader started");
        Ok(())
    }

    /// Stops frame delivery and shuts the capture session down.
    pub fn stop(&mut self) -> Result<(), StopCameraError> {
        let Some(token) = self.arrived_token.take() else {
            return Err(StopCameraError::NotStarted);
        };

        (|| self.reader.StopAsync()?.get())().map_err(StopCameraError::StopReader)?;
        self.reader
            .RemoveFrameArrived(token)
            .map_err(StopCameraError::StopReader)?;
        let _ = self.capture.Close();

        tracing::info!("camera frame reader stopped");
        Ok(())
    }
}

fn init_winrt() -> Result<(), OpenCameraError> {
    if let Err(e) = unsafe { RoInitialize(RO_INIT_MULTITHREADED) }
        && e.code() != S_FALSE
    {
        return Err(OpenCameraError::InitializeWinRT(e));
    }
    Ok(())
}

fn find_color_source() -> Result<(MediaFrameSourceGroup, MediaFrameSourceInfo), OpenCameraError> {
    let found = (|| {
        let groups = MediaFrameSourceGroup::FindAllAsync()?.get()?;
        for i in 0..groups.Size()? {
            let group = groups.GetAt(i)?;
            let infos = group.SourceInfos()?;
            for j in 0..infos.Size()? {
                let info = infos.GetAt(j)?;
                if info.SourceKind()? == MediaFrameSourceKind::Color {
                    return Ok(Some((group, info)));
                }
            }
        }
        Ok(None)
    })()
    .map_err(OpenCameraError::EnumerateSourceGroups)?;

    found.ok_or(OpenCameraError::NoCamera)
}

/// Applies the format selection policy to the source's supported formats.
/// When the camera reports nothing usable the current format stays in
/// effect.
fn configure_format(source: &MediaFrameSource) -> windows::core::Result<()> {
    if let Ok(current) = source.CurrentFormat() {
        tracing::info!("current format: {}", describe_format(&current));
    }

    let supported = source.SupportedFormats()?;
    let mut formats = Vec::new();
    let mut candidates = Vec::new();
    for i in 0..supported.Size()? {
        let format = supported.GetAt(i)?;
        let video = format.VideoFormat()?;
        let rate = format.FrameRate()?;
        candidates.push(CaptureFormat::new(
            video.Width()?,
            video.Height()?,
            (rate.Numerator()?, rate.Denominator()?),
        ));
        formats.push(format);
    }

    let Some(selected) = select_capture_format(&candidates) else {
        tracing::warn!("camera reports no usable formats, keeping current format");
        return Ok(());
    };
    let index = candidates
        .iter()
        .position(|candidate| *candidate == selected)
        .expect("selected format comes from candidates");

    tracing::info!("requesting format: {}", describe_format(&formats[index]));
    source.SetFormatAsync(&formats[index])?.get()
}

fn describe_format(format: &MediaFrameFormat) -> String {
    let (width, height) = format
        .VideoFormat()
        .map(|v| (v.Width().unwrap_or(0), v.Height().unwrap_or(0)))
        .unwrap_or((0, 0));
    let (num, den) = format
        .FrameRate()
        .map(|r| (r.Numerator().unwrap_or(0), r.Denominator().unwrap_or(1)))
        .unwrap_or((0, 1));
    let subtype = format
        .Subtype()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    format!("{width}x{height}@{num}/{den} {subtype}")
}
