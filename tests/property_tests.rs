use proptest::prelude::*;
use soundpath::audio::*;

proptest! {
    /// Band gains land inside the configured range no matter what the
    /// control thread throws at the setter.
    #[test]
    fn prop_band_gain_always_clamped(
        band in 0usize..10,
        gain in -1000.0f32..1000.0,
    ) {
        let eq = ParametricEqualizer::with_defaults();
        eq.set_band_gain(band, gain);
        let target = eq.get_target_gain(band);
        prop_assert!((-15.0..=15.0).contains(&target));
    }

    /// Whole gain vectors are clamped element-wise and stay idempotent.
    #[test]
    fn prop_gain_vector_clamped(gains in proptest::collection::vec(-100.0f32..100.0, 10)) {
        let eq = ParametricEqualizer::with_defaults();
        let handle = eq.handle();
        handle.set_band_gains(&gains);
        for target in handle.target_gains() {
            prop_assert!((-15.0..=15.0).contains(&target));
        }
        prop_assert!(handle.pre_cut_linear() <= 1.0 + 1e-6);
    }

    /// A flat equalizer is bit-transparent for arbitrary PCM input.
    #[test]
    fn prop_flat_eq_is_transparent(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut eq = ParametricEqualizer::with_defaults();
        let mut output = vec![0u8; bytes.len()];
        let written = eq.process(&bytes, &mut output, 44100, 1);
        prop_assert_eq!(written, bytes.len() - bytes.len() % 2);
        prop_assert_eq!(&output[..written], &bytes[..written]);
    }

    /// i16 -> f32 -> i16 conversion is lossless across the full range.
    #[test]
    fn prop_pcm_conversion_round_trips(sample in any::<i16>()) {
        let converted = PcmConverter::f32_to_i16(PcmConverter::i16_to_f32(sample));
        prop_assert_eq!(converted, sample);
    }

    /// The ring never reports more data than its capacity and never panics,
    /// whatever the write count.
    #[test]
    fn prop_ring_fill_bounded(min_samples in 1usize..512, writes in 0usize..4096) {
        let mut ring = CircularSampleBuffer::new(min_samples);
        for i in 0..writes {
            ring.put(i as i16);
        }
        prop_assert!(ring.available_data_size() <= ring.capacity() * 2);
        prop_assert!(ring.capacity().is_power_of_two());
        // Reads inside and outside the valid region both stay panic-free.
        let _ = ring.get(0);
        let _ = ring.get(ring.capacity() * 4);
    }

    /// After overflowing by k samples, the oldest visible sample is the
    /// k-th written one.
    #[test]
    fn prop_ring_drops_oldest_on_overflow(extra in 1usize..64) {
        let mut ring = CircularSampleBuffer::new(128); // exact power of two
        for i in 0..(128 + extra) {
            ring.put(i as i16);
        }
        prop_assert_eq!(ring.get(0), extra as i16);
    }
}
