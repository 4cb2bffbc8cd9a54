use windows::Win32::Graphics::{
    Direct3D11::{
        D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_TEXTURE2D_DESC,
        D3D11_USAGE_STAGING, ID3D11Texture2D,
    },
    Dxgi::Common::DXGI_FORMAT_B8G8R8A8_UNORM,
};

use crate::ConvertError;
use crate::converter::created;

/// Copies a BGRA texture back to CPU memory as tightly packed rows
/// (width * height * 4 bytes).
///
/// Verification and debugging aid only; the production conversion path never
/// reads pixels back.
pub fn read_back_bgra(texture: &ID3D11Texture2D) -> Result<Vec<u8>, ConvertError> {
    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };
    if desc.Format != DXGI_FORMAT_B8G8R8A8_UNORM {
        return Err(ConvertError::Readback(format!(
            "unsupported format {:?}",
            desc.Format
        )));
    }

    let device = unsafe { texture.GetDevice() }
        .map_err(|e| ConvertError::DeviceAcquisition(format!("{e:?}")))?;
    let context = unsafe { device.GetImmediateContext() }
        .map_err(|e| ConvertError::DeviceAcquisition(format!("{e:?}")))?;

    let staging_desc = D3D11_TEXTURE2D_DESC {
        Usage: D3D11_USAGE_STAGING,
        BindFlags: 0,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: 0,
        ..desc
    };
    let mut staging: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&staging_desc, None, Some(&mut staging)) }
        .map_err(|e| ConvertError::ResourceCreation("staging texture", format!("{e:?}")))?;
    let staging = created(staging, "staging texture")?;

    unsafe { context.CopyResource(&staging, texture) };

    let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
    unsafe { context.Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
        .map_err(|e| ConvertError::Readback(format!("{e:?}")))?;

    let row_bytes = desc.Width as usize * 4;
    let mut data = vec![0u8; row_bytes * desc.Height as usize];
    for y in 0..desc.Height as usize {
        unsafe {
            std::ptr::copy_nonoverlapping(
                (mapped.pData as *const u8).add(y * mapped.RowPitch as usize),
                data.as_mut_ptr().add(y * row_bytes),
                row_bytes,
            );
        }
    }

    unsafe { context.Unmap(&staging, 0) };

    Ok(data)
}
