//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use std::fmt::Debug;
use std::hash::Hash;

/// Models a type that can act as a key for [`ArenaMap`](crate::arena::ArenaMap).
///
/// Keys are thin wrappers around an index; they are `Copy`, totally ordered
/// and hashable so that they can be used inside the ordered maps and sets
/// that the dataflow code is built on.
///
/// This trait should not usually be implemented by hand, the
/// [`dense_arena_key`](crate::dense_arena_key) macro provides the
/// implementation (and the standard derives) in one go.
pub trait ArenaKey: Copy + Eq + Ord + Hash + Debug {
    /// Creates a key from an arena index.
    ///
    /// Panics if the index is not representable in the key's storage type.
    fn new(index: usize) -> Self;

    /// Returns the arena index this key refers to.
    fn index(self) -> usize;
}

/// Creates a type-safe key for an [`ArenaMap`](crate::arena::ArenaMap) with
/// [`u32`] as the underlying storage type.
///
/// ```
/// # use citrine::dense_arena_key;
/// # use citrine::arena::ArenaMap;
/// dense_arena_key! {
///     /// Refers to a thing stored in some arena.
///     pub struct Thing;
/// }
///
/// let mut things = ArenaMap::default();
/// let t: Thing = things.insert("hello");
///
/// assert_eq!(things[t], "hello");
/// ```
#[macro_export]
macro_rules! dense_arena_key {
    ( $(#[$outer:meta])* $vis:vis struct $name:ident; $($rest:tt)* ) => {
        $(#[$outer])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(u32);

        impl $crate::arena::ArenaKey for $name {
            #[inline]
            fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect("arena index does not fit in u32"))
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::write!(f, "{}({})", ::std::stringify!($name), self.0)
            }
        }

        $crate::dense_arena_key!($($rest)*);
    };

    () => {}
}
