#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_runtime::{Bridge, Handle, ManagedObject};

#[derive(Arbitrary, Debug)]
enum Op {
    StoreInt(i64),
    StoreStr(u8),
    StoreNone,
    Borrow(u8),
    IncRef(u8),
    DecRef(u8),
    FreeTemps,
}

// Shadow model: for each handle, the references the driver still owns.
fuzz_target!(|ops: Vec<Op>| {
    let bridge = Bridge::with_defaults();
    let strings: Vec<ManagedObject> = (0..4).map(|i| ManagedObject::str(&format!("s{i}"))).collect();
    let mut owned: Vec<(Handle, isize)> = Vec::new();

    let pick = |owned: &Vec<(Handle, isize)>, idx: u8| -> Option<usize> {
        (!owned.is_empty()).then(|| idx as usize % owned.len())
    };
    let add = |owned: &mut Vec<(Handle, isize)>, handle: Handle| {
        match owned.iter_mut().find(|(h, _)| *h == handle) {
            Some(slot) => slot.1 += 1,
            None => owned.push((handle, 1)),
        }
    };

    for op in ops.into_iter().take(256) {
        match op {
            Op::StoreInt(v) => add(&mut owned, bridge.store(ManagedObject::Int(v))),
            Op::StoreStr(i) => {
                let object = strings[i as usize % strings.len()].clone();
                add(&mut owned, bridge.store(object));
            }
            Op::StoreNone => add(&mut owned, bridge.store(ManagedObject::None)),
            Op::Borrow(i) => {
                let object = strings[i as usize % strings.len()].clone();
                bridge.store_borrowed(object).expect("pool available");
            }
            Op::IncRef(i) => {
                if let Some(at) = pick(&owned, i) {
                    bridge.inc_ref(owned[at].0).expect("owned handle is live");
                    owned[at].1 += 1;
                }
            }
            Op::DecRef(i) => {
                if let Some(at) = pick(&owned, i) {
                    bridge.dec_ref(owned[at].0).expect("owned handle is live");
                    owned[at].1 -= 1;
                    if owned[at].1 == 0 {
                        owned.swap_remove(at);
                    }
                }
            }
            Op::FreeTemps => bridge.free_temps().expect("pooled handles are live"),
        }
        for (handle, count) in &owned {
            assert!(bridge.ref_count(*handle).expect("owned handle is live") >= *count);
        }
    }

    bridge.free_temps().expect("pooled handles are live");
    for (handle, count) in &owned {
        assert_eq!(bridge.ref_count(*handle).expect("owned handle is live"), *count);
    }
    for (handle, count) in owned {
        for _ in 0..count {
            bridge.dec_ref(handle).expect("owned handle is live");
        }
    }
    assert_eq!(bridge.live_count(), 0);
});
