use alloy_primitives::{Address, Log};
use alloy_sol_types::{sol, SolEvent};

sol! {
    /// Emitted by the factory exactly once per successful deployment.
    #[derive(Debug, PartialEq, Eq)]
    event TokenCreated(address tokenAddress);

    /// Emitted by the pair registry; `token0 < token1` always holds.
    #[derive(Debug, PartialEq, Eq)]
    event PairCreated(
        address indexed token0,
        address indexed token1,
        address pair,
        uint256 allPairsLength
    );
}

/// Logs of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub origin: Address,
    pub logs: Vec<Log>,
}

impl Receipt {
    /// First event of kind `E` emitted by `emitter`.
    ///
    /// Lookup is by event signature and emitter, so unrelated logs from
    /// sub-calls can appear in any order without affecting the result.
    pub fn event<E: SolEvent>(&self, emitter: Address) -> Option<E> {
        self.events::<E>(emitter).next()
    }

    /// All events of kind `E` emitted by `emitter`, in emission order.
    pub fn events<E: SolEvent>(&self, emitter: Address) -> impl Iterator<Item = E> + '_ {
        self.logs
            .iter()
            .filter(move |log| {
                log.address == emitter && log.data.topics().first() == Some(&E::SIGNATURE_HASH)
            })
            .filter_map(|log| E::decode_log_data(&log.data, true).ok())
    }

    /// Events of kind `E` from any emitter, paired with the emitting address.
    pub fn events_any<E: SolEvent>(&self) -> impl Iterator<Item = (Address, E)> + '_ {
        self.logs
            .iter()
            .filter(|log| log.data.topics().first() == Some(&E::SIGNATURE_HASH))
            .filter_map(|log| {
                E::decode_log_data(&log.data, true)
                    .ok()
                    .map(|event| (log.address, event))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{keccak256, U256};

    fn log<E: SolEvent>(emitter: Address, event: &E) -> Log {
        Log {
            address: emitter,
            data: event.encode_log_data(),
        }
    }

    #[test]
    fn test_signatures() {
        assert_eq!(TokenCreated::SIGNATURE, "TokenCreated(address)");
        assert_eq!(
            PairCreated::SIGNATURE_HASH,
            keccak256("PairCreated(address,address,address,uint256)")
        );
    }

    #[test]
    fn test_pair_created_topics() {
        let token0 = Address::repeat_byte(0x01);
        let token1 = Address::repeat_byte(0x02);
        let event = PairCreated {
            token0,
            token1,
            pair: Address::repeat_byte(0x03),
            allPairsLength: U256::from(1),
        };
        let data = event.encode_log_data();
        assert_eq!(data.topics().len(), 3);
        assert_eq!(&data.topics()[1][12..], token0.as_slice());
        assert_eq!(&data.topics()[2][12..], token1.as_slice());
    }

    #[test]
    fn test_lookup_by_kind_ignores_position() {
        let factory = Address::repeat_byte(0xfa);
        let registry = Address::repeat_byte(0xee);
        let token = Address::repeat_byte(0x10);
        let pair_event = PairCreated {
            token0: Address::repeat_byte(0x01),
            token1: token,
            pair: Address::repeat_byte(0x20),
            allPairsLength: U256::from(7),
        };

        // Pair event first, then an unrelated log, then the factory signal.
        let receipt = Receipt {
            origin: Address::ZERO,
            logs: vec![
                log(registry, &pair_event),
                Log::new_unchecked(Address::repeat_byte(0x99), vec![], Default::default()),
                log(factory, &TokenCreated { tokenAddress: token }),
            ],
        };

        assert_eq!(
            receipt.event::<TokenCreated>(factory),
            Some(TokenCreated { tokenAddress: token })
        );
        assert_eq!(receipt.event::<PairCreated>(registry), Some(pair_event));
    }

    #[test]
    fn test_lookup_filters_by_emitter() {
        let factory = Address::repeat_byte(0xfa);
        let impostor = Address::repeat_byte(0xbb);
        let receipt = Receipt {
            origin: Address::ZERO,
            logs: vec![log(
                impostor,
                &TokenCreated {
                    tokenAddress: Address::repeat_byte(0x01),
                },
            )],
        };

        assert!(receipt.event::<TokenCreated>(factory).is_none());
        assert_eq!(receipt.events_any::<TokenCreated>().count(), 1);
    }
}
