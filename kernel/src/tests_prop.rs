use crate::consts::PAGE_SIZE;
use crate::mm::{
    pn_to_addr, Direction, MemorySet, MmapFlags, MmapProts, Vmmap, VirtAddr, USER_PN_HIGH,
    USER_PN_LOW,
};
use crate::testing::{new_cache, MockPageTable};
use proptest::prelude::*;

const RW: MmapProts = MmapProts::PROT_READ.union(MmapProts::PROT_WRITE);

fn check_layout(map: &Vmmap) -> Result<(), TestCaseError> {
    let mut prev_end = USER_PN_LOW;
    for vma in map.iter() {
        prop_assert!(vma.start() < vma.end());
        prop_assert!(vma.start() >= prev_end, "{:#x} overlaps previous end {:#x}", vma.start(), prev_end);
        prop_assert!(vma.end() <= USER_PN_HIGH);
        prev_end = vma.end();
    }
    Ok(())
}

#[derive(Clone, Debug)]
enum Op {
    Map { at: Option<usize>, npages: usize, shared: bool },
    Unmap { at: usize, npages: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (prop::option::of(0usize..64), 1usize..8, any::<bool>())
            .prop_map(|(at, npages, shared)| Op::Map { at, npages, shared }),
        (0usize..64, 1usize..16).prop_map(|(at, npages)| Op::Unmap { at, npages }),
    ]
}

proptest! {
    #[test]
    fn regions_never_overlap(ops in prop::collection::vec(op(), 1..40)) {
        let cache = new_cache(64);
        let pt = MockPageTable::new();
        let mut map = Vmmap::new();

        for op in ops {
            match op {
                Op::Map { at, npages, shared } => {
                    let sharing = if shared { MmapFlags::MAP_SHARED } else { MmapFlags::MAP_PRIVATE };
                    let lopage = at.map_or(0, |at| USER_PN_LOW + at);
                    let vma = map
                        .map(&cache, &*pt, None, lopage, npages, RW, sharing | MmapFlags::MAP_ANONYMOUS, 0, Direction::LowToHigh)
                        .unwrap();
                    prop_assert_eq!(vma.npages(), npages);
                }
                Op::Unmap { at, npages } => {
                    map.remove(&cache, &*pt, USER_PN_LOW + at, npages).unwrap();
                    for vfn in USER_PN_LOW + at..USER_PN_LOW + at + npages {
                        prop_assert!(map.lookup(vfn).is_none());
                    }
                }
            }
            check_layout(&map)?;
        }

        map.destroy(&cache, &*pt);
        prop_assert_eq!(cache.nframes(), 0);
    }

    #[test]
    fn write_then_read_returns_the_same_bytes(
        offset in 0usize..3 * PAGE_SIZE,
        data in prop::collection::vec(any::<u8>(), 0..2 * PAGE_SIZE),
    ) {
        let cache = new_cache(16);
        let mut memory_set = MemorySet::new(MockPageTable::new(), cache);
        let lo = memory_set
            .map_area(None, 0, 5, RW, MmapFlags::MAP_PRIVATE | MmapFlags::MAP_ANONYMOUS, 0, Direction::HighToLow)
            .unwrap();
        let base = VirtAddr(pn_to_addr(lo) + offset);

        memory_set.copy_out(base, &data).unwrap();
        let mut back = vec![0u8; data.len()];
        memory_set.copy_in(base, &mut back).unwrap();
        prop_assert_eq!(back, data);
    }
}
