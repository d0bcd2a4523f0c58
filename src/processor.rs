// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

/// In-place transform of the raw payload of one buffer.
///
/// There is no failure path: a processor that runs into trouble has to report
/// it out of band, the buffer is pushed downstream either way. Processors that
/// also listen to their property store get notifications from other threads,
/// so any state shared between `process()` and the notification handlers needs
/// its own locking.
pub trait FrameProcessor: Send + Sync {
    fn process(&self, data: &mut [u8]);
}

impl<F> FrameProcessor for F
where
    F: Fn(&mut [u8]) + Send + Sync,
{
    fn process(&self, data: &mut [u8]) {
        self(data)
    }
}
