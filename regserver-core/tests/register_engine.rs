//! Integration tests for the register engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use regserver_core::{
    ConfigError, ExceptionCode, ModbusServerCore, RangeSpec, RegisterKind, Reply, Request, hook,
};

fn read_holding(
    core: &mut ModbusServerCore,
    address: u16,
    quantity: u16,
) -> Result<Reply, ExceptionCode> {
    core.handle(&Request::ReadHolding { address, quantity })
}

#[test]
fn test_reads_are_idempotent_without_hooks() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(0, 5).with_default(0x1234))
        .build()
        .unwrap();

    let first = read_holding(&mut core, 0, 5).unwrap();
    let second = read_holding(&mut core, 0, 5).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, Reply::Registers(vec![0x1234; 5]));
}

#[test]
fn test_write_then_read() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(40, 10))
        .build()
        .unwrap();

    for (address, value) in [(40u16, 1u16), (45, 0xFFFF), (49, 300)] {
        core.handle(&Request::WriteHolding { address, value }).unwrap();
        assert_eq!(
            read_holding(&mut core, address, 1),
            Ok(Reply::Registers(vec![value]))
        );
    }
}

#[test]
fn test_read_hook_override() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(100, 2).on_read(hook(|address, _| address - 100 + 1)))
        .build()
        .unwrap();

    assert_eq!(read_holding(&mut core, 100, 1), Ok(Reply::Registers(vec![1])));
    assert_eq!(read_holding(&mut core, 101, 1), Ok(Reply::Registers(vec![2])));
    assert_eq!(core.peek(RegisterKind::Holding, 100), Ok(0));
    assert_eq!(core.peek(RegisterKind::Holding, 101), Ok(0));
}

#[test]
fn test_write_hook_clamp() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(10, 1).on_write(hook(|_, value| value.min(100))))
        .build()
        .unwrap();

    core.handle(&Request::WriteHolding {
        address: 10,
        value: 500,
    })
    .unwrap();
    assert_eq!(read_holding(&mut core, 10, 1), Ok(Reply::Registers(vec![100])));
}

#[test]
fn test_read_spanning_gap_is_rejected() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(0, 10).with_default(8))
        .holding(RangeSpec::new(20, 10))
        .build()
        .unwrap();
    let before = core.snapshot();

    assert_eq!(
        read_holding(&mut core, 5, 10),
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(core.snapshot(), before);
}

#[test]
fn test_write_crossing_ranges_is_all_or_nothing() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(0, 10))
        .holding(RangeSpec::new(10, 10))
        .build()
        .unwrap();

    assert_eq!(
        core.handle(&Request::WriteMultipleHolding {
            address: 8,
            values: vec![1, 2, 3, 4],
        }),
        Err(ExceptionCode::IllegalDataAddress)
    );
    for address in 0..20 {
        assert_eq!(core.peek(RegisterKind::Holding, address), Ok(0));
    }
}

#[test]
fn test_write_into_unmapped_tail_is_all_or_nothing() {
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(0, 4))
        .build()
        .unwrap();

    assert_eq!(
        core.handle(&Request::WriteMultipleHolding {
            address: 2,
            values: vec![7, 7, 7],
        }),
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(read_holding(&mut core, 0, 4), Ok(Reply::Registers(vec![0; 4])));
}

#[test]
fn test_overlap_rejection() {
    let err = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(10, 10))
        .holding(RangeSpec::new(15, 10))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ConfigError::OverlappingRange {
            start: 15,
            count: 10,
            existing_start: 10,
            existing_count: 10,
        }
    );
    assert_eq!(
        err.to_string(),
        "Register range [15, 25) overlaps existing range [10, 20)"
    );
}

#[test]
fn test_hook_receives_absolute_addresses() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = seen.clone();
    let mut core = ModbusServerCore::builder(1)
        .holding(RangeSpec::new(300, 3).on_write(hook(move |address, value| {
            log.lock().unwrap().push(address);
            value
        })))
        .build()
        .unwrap();

    core.handle(&Request::WriteMultipleHolding {
        address: 300,
        values: vec![1, 2, 3],
    })
    .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![300, 301, 302]);
}

#[test]
fn test_stateful_read_hook_keeps_its_own_state() {
    let reads = Arc::new(AtomicU16::new(0));
    let counter = reads.clone();
    let mut core = ModbusServerCore::builder(1)
        .input(RangeSpec::new(0, 1).on_read(hook(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed) + 1
        })))
        .build()
        .unwrap();

    let read = Request::ReadInput {
        address: 0,
        quantity: 1,
    };
    assert_eq!(core.handle(&read), Ok(Reply::Registers(vec![1])));
    assert_eq!(core.handle(&read), Ok(Reply::Registers(vec![2])));
    assert_eq!(core.peek(RegisterKind::Input, 0), Ok(0));
    assert_eq!(reads.load(Ordering::Relaxed), 2);
}

#[test]
fn test_snapshot_json() {
    let core = ModbusServerCore::builder(3)
        .input(RangeSpec::new(5, 2).with_default(1))
        .build()
        .unwrap();

    let json = serde_json::to_value(core.snapshot()).unwrap();
    assert_eq!(json["station_address"], 3);
    assert_eq!(json["input_registers"][0]["kind"], "input");
    assert_eq!(json["input_registers"][0]["start_address"], 5);
    assert_eq!(json["input_registers"][0]["values"], serde_json::json!([1, 1]));
    assert!(json["holding_registers"].as_array().unwrap().is_empty());
}
