use proptest::prelude::*;
use skipdelta::chain::{Revisions, StoreOptions, base_chain, delta_base};
use skipdelta::codec::{DeltaCodec, DeltaOptions, delta};
use skipdelta::memo::LruMemo;

fn encode(base: &[u8], target: &[u8], level: u32) -> Vec<u8> {
    delta::encode(
        base,
        target,
        &DeltaOptions {
            level,
            checksum: true,
        },
    )
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn prop_encode_decode_roundtrip(
        base in proptest::collection::vec(any::<u8>(), 0..4096),
        target in proptest::collection::vec(any::<u8>(), 0..4096),
        level in 0u32..=9u32
    ) {
        let delta = encode(&base, &target, level);
        let decoded = delta::decode(&base, &delta).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_identical_data_is_highly_compressible(
        base in proptest::collection::vec(any::<u8>(), 64..8192),
        level in 1u32..=9u32
    ) {
        let delta = encode(&base, &base, level);
        prop_assert!(delta.len() < base.len() / 2, "delta={} base={}", delta.len(), base.len());
    }

    #[test]
    fn prop_decode_never_panics(
        base in proptest::collection::vec(any::<u8>(), 0..256),
        garbage in proptest::collection::vec(any::<u8>(), 0..512)
    ) {
        let _ = delta::decode(&base, &garbage);
    }

    #[test]
    fn prop_base_clears_lowest_bit(n in 1usize..1_000_000) {
        let base = delta_base(n).unwrap();
        prop_assert!(base < n);
        prop_assert_eq!(n - base, 1 << n.trailing_zeros());
        let chain: Vec<usize> = base_chain(n).collect();
        prop_assert_eq!(chain.len() as u32, n.count_ones());
        prop_assert_eq!(chain.last().copied(), Some(0));
        prop_assert!(chain.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn prop_memo_never_exceeds_limit(
        limit in 0usize..8,
        keys in proptest::collection::vec(0u8..16, 0..64)
    ) {
        let mut memo: LruMemo<u8, u32> = LruMemo::bounded(limit);
        for key in keys {
            let value = memo.get_or_insert_with(&[key], || u32::from(key) * 3);
            prop_assert_eq!(value, u32::from(key) * 3);
            prop_assert!(memo.len() <= limit);
            prop_assert_eq!(memo.cache().len(), memo.len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_store_roundtrip(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..512), 1..24),
        cache_size in 0usize..6
    ) {
        let restored = block_on(async {
            let mut revs = Revisions::new(
                DeltaCodec::default(),
                StoreOptions { cache_size, ..StoreOptions::default() },
            );
            let mut out = Vec::new();
            for (index, payload) in payloads.iter().enumerate() {
                revs.push(payload.clone()).await.unwrap();
                out.push((index, revs.get(index / 2).await.unwrap()));
            }
            let json = revs.to_json().unwrap();
            let copy = Revisions::from_json(&json, DeltaCodec::default(), StoreOptions::default()).unwrap();
            let mut all = Vec::new();
            for index in 0..copy.len() {
                all.push(copy.get(index).await.unwrap());
            }
            (out, all)
        });

        let (interleaved, all) = restored;
        for (index, data) in interleaved {
            prop_assert_eq!(data.as_ref(), payloads[index / 2].as_slice());
        }
        prop_assert_eq!(all.len(), payloads.len());
        for (data, payload) in all.iter().zip(&payloads) {
            prop_assert_eq!(data.as_ref(), payload.as_slice());
        }
    }
}
