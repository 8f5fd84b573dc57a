//! Tests for memory-object buffer ownership and reference-count invariants

use primforge::{AllocMode, DataType, Engine, EngineKind, FormatTag, MemoryObject, TensorDesc};

fn engine() -> Engine {
    Engine::new(EngineKind::Virtual).expect("Failed to create engine")
}

fn desc_2x3x4x5() -> TensorDesc {
    TensorDesc::new(&[2, 3, 4, 5], DataType::F32, FormatTag::Nchw)
        .expect("Failed to build tensor layout")
}

fn desc_4x4x4x4() -> TensorDesc {
    TensorDesc::new(&[4, 4, 4, 4], DataType::F32, FormatTag::Nchw)
        .expect("Failed to build tensor layout")
}

#[test]
fn memory_created_without_buffer_reports_none() {
    let engine = engine();
    let mem = MemoryObject::new(&engine, desc_2x3x4x5(), AllocMode::None)
        .expect("Failed to create memory object");

    assert!(mem.handle().is_none(), "Fresh object should have no buffer");
    assert!(!mem.is_library_owned());
}

#[test]
fn set_handle_round_trips_through_get() {
    let engine = engine();
    let desc = desc_2x3x4x5();
    let buffer = engine
        .alloc_buffer(desc.size_bytes())
        .expect("Failed to allocate buffer");

    let mut mem = MemoryObject::new(&engine, desc, AllocMode::None)
        .expect("Failed to create memory object");
    mem.set_handle(buffer.clone());

    let got = mem.handle().expect("Buffer should be bound after set");
    assert!(
        got.same_buffer(&buffer),
        "Get should return the exact buffer that was set"
    );

    drop(mem);
    buffer.release();
}

#[test]
fn external_buffer_refcount_survives_memory_destruction() {
    let engine = engine();
    let desc = desc_2x3x4x5();

    // External allocation: the caller holds the single reference
    let buffer = engine
        .alloc_buffer(desc.size_bytes())
        .expect("Failed to allocate buffer");
    assert_eq!(buffer.ref_count(), 1);

    {
        let mut mem = MemoryObject::new(&engine, desc, AllocMode::None)
            .expect("Failed to create memory object");
        mem.set_handle(buffer.clone());
        // Adopting the buffer must not perturb the device-side count
        assert_eq!(buffer.ref_count(), 1);
    }

    // Destroying the memory object leaves the borrowed buffer alive
    assert_eq!(
        buffer.ref_count(),
        1,
        "Borrowed buffer refcount must survive memory destruction"
    );
    assert_eq!(engine.device().live_buffers(), 1);

    buffer.release();
    assert_eq!(engine.device().live_buffers(), 0);
    assert_eq!(engine.device().allocated_bytes(), 0);
}

#[test]
fn library_owned_buffer_is_released_on_drop() {
    let engine = engine();
    {
        let mem = MemoryObject::new(&engine, desc_4x4x4x4(), AllocMode::Allocate)
            .expect("Failed to create memory object");
        assert!(mem.is_library_owned());
        assert_eq!(engine.device().live_buffers(), 1);

        let handle = mem.handle().expect("Allocate mode should bind a buffer");
        assert_eq!(handle.ref_count(), 1);
    }
    assert_eq!(engine.device().live_buffers(), 0, "Owned buffer leaked");
    assert_eq!(engine.device().allocated_bytes(), 0);
}

#[test]
fn set_handle_over_owned_buffer_releases_the_old_one() {
    let engine = engine();
    let desc = desc_4x4x4x4();
    let external = engine
        .alloc_buffer(desc.size_bytes())
        .expect("Failed to allocate buffer");

    let mut mem = MemoryObject::new(&engine, desc, AllocMode::Allocate)
        .expect("Failed to create memory object");
    assert_eq!(engine.device().live_buffers(), 2);

    mem.set_handle(external.clone());
    assert_eq!(
        engine.device().live_buffers(),
        2 - 1,
        "Replaced owned buffer should be freed"
    );
    assert!(!mem.is_library_owned());

    // Swapping in a second external buffer must not release the first:
    // the object only borrowed it
    let other = engine
        .alloc_buffer(64)
        .expect("Failed to allocate buffer");
    mem.set_handle(other.clone());
    assert_eq!(external.ref_count(), 1);
    assert_eq!(engine.device().live_buffers(), 2);

    drop(mem);
    external.release();
    other.release();
    assert_eq!(engine.device().live_buffers(), 0);
}

#[test]
fn host_round_trip_through_bound_buffer() {
    let engine = engine();
    let desc = desc_2x3x4x5();
    let mem = MemoryObject::new(&engine, desc.clone(), AllocMode::Allocate)
        .expect("Failed to create memory object");

    let data: Vec<f32> = (0..desc.nelems()).map(|i| i as f32 * 0.5).collect();
    mem.write(&data).expect("Failed to copy from host");

    let mut out = vec![0.0f32; desc.nelems()];
    mem.read(&mut out).expect("Failed to copy to host");
    assert_eq!(out, data, "Data should match after round-trip");
}

#[test]
fn allocation_beyond_device_budget_is_out_of_memory() {
    use primforge::backend::DeviceConfig;
    use primforge::PrimForgeError;

    let engine = Engine::with_config(
        EngineKind::Virtual,
        DeviceConfig {
            mem_bytes: 1024,
            ..DeviceConfig::default()
        },
    )
    .expect("Failed to create engine");

    let ok = engine.alloc_buffer(512).expect("Within budget");
    let err = engine.alloc_buffer(1024).unwrap_err();
    assert!(matches!(err, PrimForgeError::OutOfMemory(_)));

    // The failed allocation must not count against the budget
    let second = engine.alloc_buffer(512).expect("Budget should be intact");
    ok.release();
    second.release();
    assert_eq!(engine.device().allocated_bytes(), 0);
}
