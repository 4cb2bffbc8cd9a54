#![cfg(windows)]

use glint_direct3d::{ConvertError, Nv12ToBgra, read_back_bgra};
use windows::Win32::{
    Foundation::HMODULE,
    Graphics::{
        Direct3D::D3D_DRIVER_TYPE_HARDWARE,
        Direct3D11::{
            D3D11_BIND_SHADER_RESOURCE, D3D11_SDK_VERSION, D3D11_SUBRESOURCE_DATA,
            D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT, D3D11CreateDevice, ID3D11Device,
            ID3D11Texture2D,
        },
        Dxgi::Common::{DXGI_FORMAT_NV12, DXGI_SAMPLE_DESC},
    },
};

fn create_device() -> ID3D11Device {
    let mut device = None;
    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            Default::default(),
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            None,
        )
    }
    .expect("D3D11CreateDevice failed");
    device.expect("D3D11 device was null")
}

/// NV12 surface with every luma texel set to `luma` and every chroma pair
/// set to `chroma`.
fn nv12_surface(
    device: &ID3D11Device,
    width: u32,
    height: u32,
    luma: u8,
    chroma: (u8, u8),
) -> ID3D11Texture2D {
    let y_size = (width * height) as usize;
    let uv_size = y_size / 2;
    let mut data = vec![luma; y_size + uv_size];
    for (i, byte) in data[y_size..].iter_mut().enumerate() {
        *byte = if i % 2 == 0 { chroma.0 } else { chroma.1 };
    }

    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_NV12,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };
    let init = D3D11_SUBRESOURCE_DATA {
        pSysMem: data.as_ptr() as *const _,
        SysMemPitch: width,
        SysMemSlicePitch: 0,
    };

    let mut texture = None;
    unsafe { device.CreateTexture2D(&desc, Some(&init), Some(&mut texture)) }
        .expect("NV12 texture creation failed");
    texture.expect("NV12 texture was null")
}

#[test]
#[ignore] // Only run when a GPU is available
fn unchanged_size_reuses_shared_texture() {
    let device = create_device();
    let surface = nv12_surface(&device, 640, 360, 128, (128, 128));

    let mut converter = Nv12ToBgra::new();
    let first = converter.convert(&surface).unwrap();
    let second = converter.convert(&surface).unwrap();

    assert_eq!(first.handle, second.handle, "no reallocation on same size");
    assert_eq!((second.width, second.height), (640, 360));
}

#[test]
#[ignore] // Only run when a GPU is available
fn resize_produces_fresh_handle_and_dimensions() {
    let device = create_device();
    let small = nv12_surface(&device, 320, 180, 128, (128, 128));
    let large = nv12_surface(&device, 640, 360, 128, (128, 128));

    let mut converter = Nv12ToBgra::new();
    let first = converter.convert(&small).unwrap();
    assert_eq!((first.width, first.height), (320, 180));

    let second = converter.convert(&large).unwrap();
    assert_ne!(
        first.handle, second.handle,
        "resize must invalidate the old handle"
    );
    assert_eq!((second.width, second.height), (640, 360));
}

#[test]
#[ignore] // Only run when a GPU is available
fn conversion_covers_every_pixel() {
    let device = create_device();
    let surface = nv12_surface(&device, 128, 72, 128, (128, 128));

    let mut converter = Nv12ToBgra::new();
    converter.convert(&surface).unwrap();

    let output = converter.output().expect("output texture exists");
    let pixels = read_back_bgra(output.texture()).unwrap();

    // The render target is cleared magenta before the draw; any surviving
    // magenta pixel means the triangle missed part of the viewport.
    let magenta = pixels
        .chunks_exact(4)
        .any(|px| px[0] == 255 && px[1] == 0 && px[2] == 255);
    assert!(!magenta, "clear color visible in converted output");
}

#[test]
#[ignore] // Only run when a GPU is available
fn white_input_converts_to_white_output() {
    let device = create_device();
    // Limited-range white: luma 235, neutral chroma.
    let surface = nv12_surface(&device, 640, 360, 235, (128, 128));

    let mut converter = Nv12ToBgra::new();
    let frame = converter.convert(&surface).unwrap();
    assert_eq!((frame.width, frame.height), (640, 360));

    let output = converter.output().expect("output texture exists");
    let pixels = read_back_bgra(output.texture()).unwrap();

    for (i, px) in pixels.chunks_exact(4).enumerate() {
        // 1.164 * (235 - 16) / 256 ~= 0.996 on every channel.
        assert!(
            px[0] >= 248 && px[1] >= 248 && px[2] >= 248,
            "pixel {i} not white: {px:?}"
        );
        assert_eq!(px[3], 255, "pixel {i} alpha");
    }
}

#[test]
#[ignore] // Only run when a GPU is available
fn cross_device_surface_is_rejected() {
    let device_a = create_device();
    let device_b = create_device();
    let surface_a = nv12_surface(&device_a, 320, 180, 128, (128, 128));
    let surface_b = nv12_surface(&device_b, 320, 180, 128, (128, 128));

    let mut converter = Nv12ToBgra::new();
    converter.convert(&surface_a).unwrap();

    match converter.convert(&surface_b) {
        Err(ConvertError::DeviceMismatch) => {}
        other => panic!("expected DeviceMismatch, got {other:?}"),
    }
}
