use glint_bridge::{ExternalHandle, SharedFrame};
use windows::{
    Win32::{
        Foundation::HANDLE,
        Graphics::{
            Direct3D::{
                D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
                Fxc::{D3DCOMPILE_ENABLE_STRICTNESS, D3DCompile},
                ID3DBlob,
            },
            Direct3D11::{
                D3D11_BIND_RENDER_TARGET, D3D11_BIND_SHADER_RESOURCE, D3D11_BIND_VERTEX_BUFFER,
                D3D11_BUFFER_DESC, D3D11_COMPARISON_NEVER, D3D11_FILTER_MIN_MAG_MIP_LINEAR,
                D3D11_INPUT_ELEMENT_DESC, D3D11_INPUT_PER_VERTEX_DATA,
                D3D11_RENDER_TARGET_VIEW_DESC, D3D11_RENDER_TARGET_VIEW_DESC_0,
                D3D11_RESOURCE_MISC_SHARED, D3D11_RTV_DIMENSION_TEXTURE2D, D3D11_SAMPLER_DESC,
                D3D11_SHADER_RESOURCE_VIEW_DESC, D3D11_SHADER_RESOURCE_VIEW_DESC_0,
                D3D11_SRV_DIMENSION_TEXTURE2D, D3D11_SUBRESOURCE_DATA, D3D11_TEX2D_RTV,
                D3D11_TEX2D_SRV, D3D11_TEXTURE2D_DESC, D3D11_TEXTURE_ADDRESS_WRAP,
                D3D11_USAGE_DEFAULT, D3D11_VIEWPORT, ID3D11Buffer, ID3D11Device,
                ID3D11DeviceContext, ID3D11InputLayout, ID3D11PixelShader,
                ID3D11RenderTargetView, ID3D11SamplerState, ID3D11ShaderResourceView,
                ID3D11Texture2D, ID3D11VertexShader,
            },
            Dxgi::{
                Common::{
                    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R8_UNORM, DXGI_FORMAT_R8G8_UNORM,
                    DXGI_FORMAT_R32G32B32_FLOAT, DXGI_SAMPLE_DESC,
                },
                IDXGIResource,
            },
        },
    },
    core::{Interface, PCSTR, s},
};

const SHADER_SOURCE: &str = include_str!("shader.hlsl");

// Oversized triangle covering clip space; texcoords come from the vertex
// positions in the shader, so position is the only attribute.
const FULLSCREEN_TRIANGLE: [[f32; 3]; 3] =
    [[1.0, 1.0, 0.5], [1.0, -3.0, 0.5], [-3.0, 1.0, 0.5]];

// Sentinel fill; the conversion triangle must overwrite every pixel of it.
const CLEAR_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    #[error("Device acquisition failed: {0}")]
    DeviceAcquisition(String),
    #[error("Shader compilation failed: {0}")]
    ShaderCompile(String),
    #[error("Failed to create {0}: {1}")]
    ResourceCreation(&'static str, String),
    #[error("Shared handle export failed: {0}")]
    SharedHandle(String),
    #[error("Readback failed: {0}")]
    Readback(String),
    #[error("Source surface belongs to a different device than the conversion pipeline")]
    DeviceMismatch,
}

pub(crate) fn created<T>(resource: Option<T>, what: &'static str) -> Result<T, ConvertError> {
    resource.ok_or_else(|| ConvertError::ResourceCreation(what, "returned null".to_string()))
}

/// Render-target texture shared with the consuming graphics API.
///
/// The OS handle stays stable for the texture's lifetime and dies with it;
/// a resize therefore invalidates every handle issued before it.
pub struct SharedOutputTexture {
    texture: ID3D11Texture2D,
    handle: HANDLE,
    width: u32,
    height: u32,
}

impl SharedOutputTexture {
    fn create(device: &ID3D11Device, width: u32, height: u32) -> Result<Self, ConvertError> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: (D3D11_BIND_RENDER_TARGET.0 | D3D11_BIND_SHADER_RESOURCE.0) as u32,
            CPUAccessFlags: 0,
            // Legacy shared handle, the flavor ANGLE's share-handle import
            // consumes.
            MiscFlags: D3D11_RESOURCE_MISC_SHARED.0 as u32,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .map_err(|e| ConvertError::ResourceCreation("shared texture", format!("{e:?}")))?;
        let texture = created(texture, "shared texture")?;

        let resource: IDXGIResource = texture
            .cast()
            .map_err(|e| ConvertError::SharedHandle(format!("{e:?}")))?;
        let handle = unsafe { resource.GetSharedHandle() }
            .map_err(|e| ConvertError::SharedHandle(format!("{e:?}")))?;

        Ok(Self {
            texture,
            handle,
            width,
            height,
        })
    }

    pub fn external_handle(&self) -> ExternalHandle {
        ExternalHandle(self.handle.0 as isize)
    }

    pub fn texture(&self) -> &ID3D11Texture2D {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

struct ConvertPipeline {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    vertex_shader: ID3D11VertexShader,
    pixel_shader: ID3D11PixelShader,
    input_layout: ID3D11InputLayout,
    vertex_buffer: ID3D11Buffer,
    sampler: ID3D11SamplerState,
}

impl ConvertPipeline {
    fn create(device: ID3D11Device, context: ID3D11DeviceContext) -> Result<Self, ConvertError> {
        let vs_blob = compile_shader(SHADER_SOURCE, s!("vs_main"), s!("vs_5_0"))?;
        let ps_blob = compile_shader(SHADER_SOURCE, s!("ps_main"), s!("ps_5_0"))?;
        let vs_bytes = unsafe { blob_bytes(&vs_blob) };
        let ps_bytes = unsafe { blob_bytes(&ps_blob) };

        let mut vertex_shader: Option<ID3D11VertexShader> = None;
        unsafe { device.CreateVertexShader(vs_bytes, None, Some(&mut vertex_shader)) }
            .map_err(|e| ConvertError::ResourceCreation("vertex shader", format!("{e:?}")))?;
        let vertex_shader = created(vertex_shader, "vertex shader")?;

        let mut pixel_shader: Option<ID3D11PixelShader> = None;
        unsafe { device.CreatePixelShader(ps_bytes, None, Some(&mut pixel_shader)) }
            .map_err(|e| ConvertError::ResourceCreation("pixel shader", format!("{e:?}")))?;
        let pixel_shader = created(pixel_shader, "pixel shader")?;

        let input_elements = [D3D11_INPUT_ELEMENT_DESC {
            SemanticName: s!("POSITION"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32B32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 0,
            InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        }];
        let mut input_layout: Option<ID3D11InputLayout> = None;
        unsafe { device.CreateInputLayout(&input_elements, vs_bytes, Some(&mut input_layout)) }
            .map_err(|e| ConvertError::ResourceCreation("input layout", format!("{e:?}")))?;
        let input_layout = created(input_layout, "input layout")?;

        let vertex_data = D3D11_SUBRESOURCE_DATA {
            pSysMem: FULLSCREEN_TRIANGLE.as_ptr() as *const _,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        };
        let buffer_desc = D3D11_BUFFER_DESC {
            ByteWidth: std::mem::size_of_val(&FULLSCREEN_TRIANGLE) as u32,
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_VERTEX_BUFFER.0 as u32,
            CPUAccessFlags: 0,
            MiscFlags: 0,
            StructureByteStride: 0,
        };
        let mut vertex_buffer: Option<ID3D11Buffer> = None;
        unsafe { device.CreateBuffer(&buffer_desc, Some(&vertex_data), Some(&mut vertex_buffer)) }
            .map_err(|e| ConvertError::ResourceCreation("vertex buffer", format!("{e:?}")))?;
        let vertex_buffer = created(vertex_buffer, "vertex buffer")?;

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_WRAP,
            AddressV: D3D11_TEXTURE_ADDRESS_WRAP,
            AddressW: D3D11_TEXTURE_ADDRESS_WRAP,
            MipLODBias: 0.0,
            MaxAnisotropy: 1,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            BorderColor: [0.0, 0.0, 0.0, 0.0],
            MinLOD: 0.0,
            MaxLOD: f32::MAX,
        };
        let mut sampler: Option<ID3D11SamplerState> = None;
        unsafe { device.CreateSamplerState(&sampler_desc, Some(&mut sampler)) }
            .map_err(|e| ConvertError::ResourceCreation("sampler state", format!("{e:?}")))?;
        let sampler = created(sampler, "sampler state")?;

        Ok(Self {
            device,
            context,
            vertex_shader,
            pixel_shader,
            input_layout,
            vertex_buffer,
            sampler,
        })
    }

    /// Issues the conversion draw: the NV12 surface is read through a luma
    /// and a chroma view and rendered into the shared texture.
    ///
    /// Clobbers the context's render target, viewport and shader bindings.
    fn draw(
        &self,
        surface: &ID3D11Texture2D,
        output: &SharedOutputTexture,
    ) -> Result<(), ConvertError> {
        let srv_desc = D3D11_SHADER_RESOURCE_VIEW_DESC {
            Format: DXGI_FORMAT_R8_UNORM,
            ViewDimension: D3D11_SRV_DIMENSION_TEXTURE2D,
            Anonymous: D3D11_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2D: D3D11_TEX2D_SRV {
                    MostDetailedMip: 0,
                    MipLevels: 1,
                },
            },
        };
        let mut luma: Option<ID3D11ShaderResourceView> = None;
        unsafe {
            self.device
                .CreateShaderResourceView(surface, Some(&srv_desc), Some(&mut luma))
        }
        .map_err(|e| ConvertError::ResourceCreation("luma view", format!("{e:?}")))?;
        let luma = created(luma, "luma view")?;

        let srv_desc = D3D11_SHADER_RESOURCE_VIEW_DESC {
            Format: DXGI_FORMAT_R8G8_UNORM,
            ..srv_desc
        };
        let mut chroma: Option<ID3D11ShaderResourceView> = None;
        unsafe {
            self.device
                .CreateShaderResourceView(surface, Some(&srv_desc), Some(&mut chroma))
        }
        .map_err(|e| ConvertError::ResourceCreation("chroma view", format!("{e:?}")))?;
        let chroma = created(chroma, "chroma view")?;

        let rt_desc = D3D11_RENDER_TARGET_VIEW_DESC {
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2D,
            Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                Texture2D: D3D11_TEX2D_RTV { MipSlice: 0 },
            },
        };
        let mut target: Option<ID3D11RenderTargetView> = None;
        unsafe {
            self.device
                .CreateRenderTargetView(&output.texture, Some(&rt_desc), Some(&mut target))
        }
        .map_err(|e| ConvertError::ResourceCreation("render target view", format!("{e:?}")))?;
        let target = created(target, "render target view")?;

        unsafe {
            self.context.VSSetShader(&self.vertex_shader, None);
            self.context.PSSetShader(&self.pixel_shader, None);
            self.context.IASetInputLayout(&self.input_layout);
            self.context
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);

            let stride = (std::mem::size_of::<f32>() * 3) as u32;
            let offset = 0u32;
            self.context.IASetVertexBuffers(
                0,
                1,
                Some(&Some(self.vertex_buffer.clone())),
                Some(&stride),
                Some(&offset),
            );

            self.context
                .PSSetShaderResources(0, Some(&[Some(luma), Some(chroma)]));
            self.context
                .PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));

            self.context
                .OMSetRenderTargets(Some(&[Some(target.clone())]), None);
            let viewport = D3D11_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: output.width as f32,
                Height: output.height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };
            self.context.RSSetViewports(Some(&[viewport]));

            self.context.ClearRenderTargetView(&target, &CLEAR_COLOR);
            self.context.Draw(FULLSCREEN_TRIANGLE.len() as u32, 0);

            // The converted frame must be visible to the importing device by
            // the time its handle is published.
            self.context.Flush();
        }

        Ok(())
    }
}

struct ConverterState {
    pipeline: ConvertPipeline,
    output: Option<SharedOutputTexture>,
}

/// Persistent NV12 to BGRA converter.
///
/// Binds itself to whichever device owns the first source surface, compiles
/// the conversion pipeline once against it, and keeps one shared output
/// texture that is recreated whenever the source dimensions change.
#[derive(Default)]
pub struct Nv12ToBgra {
    state: Option<ConverterState>,
}

impl Nv12ToBgra {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts one camera surface and returns the shared handle plus the
    /// dimensions of the converted frame. The surface is only borrowed for
    /// the duration of the call.
    pub fn convert(&mut self, surface: &ID3D11Texture2D) -> Result<SharedFrame, ConvertError> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { surface.GetDesc(&mut desc) };
        let (width, height) = (desc.Width, desc.Height);

        let state = self.ensure_device(surface)?;
        let output = ensure_output(&state.pipeline.device, &mut state.output, width, height)?;
        state.pipeline.draw(surface, output)?;

        Ok(SharedFrame {
            handle: output.external_handle(),
            width,
            height,
        })
    }

    /// Shared output texture of the last conversion, if any.
    pub fn output(&self) -> Option<&SharedOutputTexture> {
        self.state.as_ref().and_then(|state| state.output.as_ref())
    }

    fn ensure_device(
        &mut self,
        surface: &ID3D11Texture2D,
    ) -> Result<&mut ConverterState, ConvertError> {
        let device = unsafe { surface.GetDevice() }
            .map_err(|e| ConvertError::DeviceAcquisition(format!("{e:?}")))?;

        if let Some(state) = self.state.as_ref() {
            // The pipeline never migrates devices; a surface from another
            // device is a hard error, not a rebuild trigger.
            if state.pipeline.device != device {
                return Err(ConvertError::DeviceMismatch);
            }
        } else {
            let context = unsafe { device.GetImmediateContext() }
                .map_err(|e| ConvertError::DeviceAcquisition(format!("{e:?}")))?;
            let pipeline = ConvertPipeline::create(device, context)?;
            self.state = Some(ConverterState {
                pipeline,
                output: None,
            });
            tracing::info!("conversion pipeline initialized");
        }

        Ok(self
            .state
            .as_mut()
            .expect("pipeline state initialized above"))
    }
}

// The converter moves into the capture callback, which the platform invokes
// from its own thread. All D3D access goes through &mut self.
unsafe impl Send for Nv12ToBgra {}

fn ensure_output<'a>(
    device: &ID3D11Device,
    slot: &'a mut Option<SharedOutputTexture>,
    width: u32,
    height: u32,
) -> Result<&'a SharedOutputTexture, ConvertError> {
    if let Some(old) = slot.take_if(|o| o.width != width || o.height != height) {
        tracing::debug!(
            old_width = old.width,
            old_height = old.height,
            width,
            height,
            "source dimensions changed, recreating shared output texture"
        );
    }
    if slot.is_none() {
        *slot = Some(SharedOutputTexture::create(device, width, height)?);
    }
    Ok(slot.as_ref().expect("output texture ensured above"))
}

fn compile_shader(
    source: &str,
    entry_point: PCSTR,
    target: PCSTR,
) -> Result<ID3DBlob, ConvertError> {
    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;

    let result = unsafe {
        D3DCompile(
            source.as_ptr() as *const _,
            source.len(),
            None,
            None,
            None,
            entry_point,
            target,
            D3DCOMPILE_ENABLE_STRICTNESS,
            0,
            &mut blob,
            Some(&mut error_blob),
        )
    };

    if let Err(e) = result {
        let detail = error_blob
            .map(|blob| String::from_utf8_lossy(unsafe { blob_bytes(&blob) }).into_owned())
            .unwrap_or_else(|| format!("{e:?}"));
        return Err(ConvertError::ShaderCompile(detail));
    }

    blob.ok_or_else(|| ConvertError::ShaderCompile("compiler returned no bytecode".to_string()))
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}
